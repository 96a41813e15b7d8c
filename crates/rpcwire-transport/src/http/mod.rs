//! Raw-socket HTTP/1.1 client.
//!
//! [`HttpRequest`] performs one outbound exchange over a connection opened
//! by a [`SocketProvider`](crate::socket::SocketProvider). The request body
//! can be written incrementally while the response is read incrementally,
//! which is what streaming RPCs need from HTTP/1.1.
//!
//! ```no_run
//! use rpcwire_transport::http::{HttpRequest, RequestOptions, ResponseCallbacks};
//! use rpcwire_transport::logging::Logger;
//! use rpcwire_transport::socket::TokioSocketProvider;
//!
//! # async fn example() -> Result<(), rpcwire_transport::TransportError> {
//! let options = RequestOptions::new("localhost")
//!     .with_port(Some(8080))
//!     .with_path("/echo.Echo/Stream");
//! let handler = ResponseCallbacks::new()
//!     .on_headers(|head| println!("status {}", head.status))
//!     .on_data(|chunk| println!("{} bytes", chunk.len()))
//!     .on_end(|| println!("done"));
//!
//! let request = HttpRequest::connect(
//!     options,
//!     &TokioSocketProvider::new(),
//!     handler,
//!     Logger::default(),
//! )?;
//! request.write(b"hello")?;
//! request.finish_write()?;
//! request.end();
//! # Ok(())
//! # }
//! ```

mod head;
pub mod parser;
mod request;

pub use head::Framing;
pub use parser::{HeaderList, ParseEvent, ResponseHead, ResponseParser};
pub use request::{
    ConnectionState, HttpRequest, RequestOptions, ResponseCallbacks, ResponseHandler,
};
