//! Call codec: the value model plus XML-RPC document encode/decode.

mod value;
mod xmlrpc;

pub use value::Value;
pub use xmlrpc::{decode, encode_call, encode_fault, encode_response, Document};
