pub mod highlight;
pub mod mouse;
pub mod predict;
pub mod search;
pub mod status;
