pub mod background;
pub mod batch;
pub mod cancel;
pub mod encode;
pub mod pairing;
pub mod pipeline;
pub mod progress;
pub mod workspace;
