pub mod consume;
pub mod produce;
pub mod status;
pub mod watermark;
