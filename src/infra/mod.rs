//! 基础设施层 - 控制 API 的 HTTP 客户端和数据流传输

pub mod http;
pub mod stream;

pub use http::HttpControlApi;
pub use stream::ZmqStreamConnector;
