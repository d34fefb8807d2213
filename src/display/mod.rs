mod controller;
mod converter;
mod headless;
mod port;
#[cfg(test)]
mod tests;

pub use controller::FramebufferDisplay;
pub use converter::DisplayConverter;
pub use headless::HeadlessDisplay;
pub use port::DisplayPort;
