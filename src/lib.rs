pub mod browser;
pub mod codegen;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod factory;
pub mod frame;
pub mod ids;
pub mod llm;
pub mod mode;
pub mod notify;
pub mod registry;
pub mod state;
pub mod step;
pub mod store;
pub mod tree;

//  Re-export commonly used items
pub use browser::capture::{ChromeCapture, NoCapture, ScreenshotSource};
pub use config::RecorderConfig;
pub use dispatcher::{Command, Dispatcher, Reply};
pub use error::{RecorderError, Result};
pub use factory::StepFactory;
pub use llm::{LanguageModel, LlmBackend};
pub use mode::{Disposition, PageSignal, RecordingMode};
pub use notify::{BroadcastNotifier, Notification, Notifier};
pub use state::{Collection, RecorderState, TestCase, Variables};
pub use step::{
    Assertion, Branch, ConditionalBlock, ElementDescriptor, FrameInfo, Step, StepAction, StepId,
    StepNode, WaitCondition,
};
pub use store::{JsonFileStore, MemoryStore, StateStore};
