pub mod capture;

pub use capture::{ChromeCapture, NoCapture, ScreenshotSource};
