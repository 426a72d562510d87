/// UFO directories held open by the designspace backend
pub(crate) mod container;
/// Designspace and single-UFO sources
pub mod designspace;
/// Remote deep-component databases
#[cfg(feature = "robocjk")]
pub mod robocjk;
/// Watching UFO directories for changes made elsewhere
#[cfg(feature = "watch")]
pub mod watch;
