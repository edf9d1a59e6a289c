mod acquisition;
mod builder;
mod discovery;
mod handle;
#[cfg(test)]
mod tests;

pub use acquisition::Acquisition;
pub use builder::CameraHandleBuilder;
pub use discovery::{discover, select_device};
pub use handle::{CameraHandle, CameraState, CloseSignal, GrabOptions};
