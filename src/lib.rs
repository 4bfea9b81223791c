pub mod acquire;
pub mod cli;
pub mod download;
pub mod error;
pub mod platform;
pub mod request;
pub mod ui;
pub mod version;

pub use acquire::{Acquirer, Installation, Outcome};
pub use cli::{Cli, Commands};
pub use error::{Error, Result};
pub use request::AcquisitionRequest;
pub use ui::{ConsoleUi, Phase, SilentUi, Ui};
