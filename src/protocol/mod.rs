pub mod chunked;
pub mod request;
pub mod response;
pub mod types;

pub use request::{Body, MultipartPart, RequestSpec};
pub use response::{parse_response, read_body, read_head, BodyMode, ResponseHead};
pub use types::{Headers, Method, Response};
