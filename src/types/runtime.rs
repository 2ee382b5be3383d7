//! Descriptors for library types the emitted code relies on.

use super::{Primitive, TypeDescriptor};

pub fn context() -> TypeDescriptor {
    TypeDescriptor::external("context", "Context")
}

pub fn request() -> TypeDescriptor {
    TypeDescriptor::external("http", "Request").pointer()
}

pub fn response_writer() -> TypeDescriptor {
    TypeDescriptor::external("http", "ResponseWriter")
}

pub fn handler() -> TypeDescriptor {
    TypeDescriptor::external("http", "Handler")
}

pub fn handler_func() -> TypeDescriptor {
    TypeDescriptor::func(vec![response_writer(), request()], vec![])
}

pub fn http_client() -> TypeDescriptor {
    TypeDescriptor::external("http", "Client").pointer()
}

pub fn url_values() -> TypeDescriptor {
    TypeDescriptor::external("url", "Values")
}

pub fn rw_mutex() -> TypeDescriptor {
    TypeDescriptor::external("sync", "RWMutex")
}

pub fn mutex() -> TypeDescriptor {
    TypeDescriptor::external("sync", "Mutex")
}

pub fn string() -> TypeDescriptor {
    TypeDescriptor::Primitive(Primitive::String)
}

pub fn strings() -> TypeDescriptor {
    TypeDescriptor::sequence(string())
}

pub fn int() -> TypeDescriptor {
    TypeDescriptor::Primitive(Primitive::Int)
}

pub fn int64() -> TypeDescriptor {
    TypeDescriptor::Primitive(Primitive::Int64)
}

pub fn boolean() -> TypeDescriptor {
    TypeDescriptor::Primitive(Primitive::Bool)
}

pub fn bytes() -> TypeDescriptor {
    TypeDescriptor::Primitive(Primitive::Bytes)
}

pub fn time() -> TypeDescriptor {
    TypeDescriptor::Primitive(Primitive::DateTime)
}

pub fn error() -> TypeDescriptor {
    TypeDescriptor::error()
}
