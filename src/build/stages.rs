pub mod assets;
pub mod chapters;
pub mod epub;
pub mod extras;
pub mod finalize;
pub mod front;
pub mod images;
pub mod pages;
pub mod postprocess;
pub mod search;
pub mod taxonomy;
