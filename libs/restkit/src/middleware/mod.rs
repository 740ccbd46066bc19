pub mod input;

pub use input::{
    GetOutput, GetService, InputMiddleware, InputMiddlewareBuilder, Missing,
    DEFAULT_MAX_BODY_BYTES,
};
