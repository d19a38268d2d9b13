//! Handler module - request dispatch by service method.
//!
//! The transport only needs one capability from the application:
//! [`RequestHandler::handle`], which decodes the argument for a service
//! method and returns the pending call. [`HandlerRegistry`] implements it
//! as a static map of method name to typed async function.
//!
//! # Example
//!
//! ```
//! use seqwire::handler::HandlerRegistry;
//! use seqwire::RpcError;
//!
//! let mut registry = HandlerRegistry::new();
//!
//! registry.register("Echo.Say", |text: String| async move { Ok(text) });
//! registry.register("Arith.Div", |(a, b): (i64, i64)| async move {
//!     if b == 0 {
//!         return Err(RpcError::handler("divide by zero"));
//!     }
//!     Ok(a / b)
//! });
//! ```

mod registry;

pub use registry::{BoxFuture, Call, Handler, HandlerRegistry, RequestHandler, TypedHandler};
