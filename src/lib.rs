//! # bytecraft
//!
//! Declarative binary parser combinators. Chain field declarations
//! (primitives, strings, buffers, nested objects, arrays, tagged choices,
//! packed bit-fields) into an immutable [Schema], then decode a single
//! in-memory buffer or run the same schema as a streaming transducer that
//! turns pushed byte chunks into decoded objects.
//!
//! ## Example
//!
//! ```
//! use bytecraft::builder::Builder;
//! use bytecraft::field::{ArrayItem, ArrayOptions};
//! use bytecraft::primitive::U16BE;
//! use bytecraft::value::Value;
//!
//! let schema = Builder::new()
//!     .uint8("n")
//!     .array("xs", ArrayItem::Prim(U16BE), ArrayOptions::count("n"))
//!     .compile()
//!     .unwrap();
//!
//! // One-shot over a buffer.
//! let parsed = schema.parse(&[0x02, 0x00, 0x0A, 0x00, 0x0B]).unwrap().unwrap();
//! assert_eq!(parsed.get("n"), Some(&Value::U64(2)));
//!
//! // Streaming, in arbitrary chunks.
//! let mut parser = schema.stream();
//! assert!(parser.write(vec![0x02, 0x00]).unwrap().is_empty());
//! let objects = parser.write(vec![0x0A, 0x00, 0x0B]).unwrap();
//! assert_eq!(objects.len(), 1);
//! ```

pub mod bits;
pub mod builder;
mod compiled;
pub mod errors;
pub mod field;
pub mod primitive;
pub mod schema;
pub mod source;
pub mod stream;
pub mod value;

pub use builder::Builder;
pub use errors::{BuildError, DecodeError};
pub use schema::{Schema, Size};
pub use stream::StreamParser;
pub use value::{Record, Value};
