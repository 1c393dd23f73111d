//! Code generation support
//!
//! Per-step page-object fragments, element naming and locator lists are
//! produced locally; whole test files come from the remote service.

pub mod locators;
pub mod naming;
pub mod prompt;
pub mod service;
pub mod template;

pub use locators::{locator_list, LocatorSettings, LocatorStrategy};
pub use naming::{element_name, fallback_step_name, step_name};
pub use service::{CodegenClient, GenerateOptions, GenerateRequest, DEFAULT_CODEGEN_URL};
pub use template::{apply, render, Rendered};
