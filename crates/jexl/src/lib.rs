#![doc = include_str!("../../../README.md")]

mod arithmetic;
mod ast;
mod context;
mod debugger;
mod engine;
mod error;
mod interpreter;
mod lexer;
mod parser;
mod template;
mod uberspect;
mod value;

pub use crate::{
    arithmetic::{Arithmetic, NumberClass},
    ast::{Node, NodeKind, Span},
    context::{EmptyContext, JexlContext, MapContext},
    debugger::Debugger,
    engine::{Engine, Expression, Script},
    error::{ErrorKind, EvalResult, JexlError, Pinpoint},
    template::{Composite, NestedExpr, SubExpr, TemplateEngine, TemplateExpr},
    uberspect::{HostObject, MethodHandle, ParamClass, RegistryUberspect, Uberspect},
    value::{Value, ValueIter, ValueKind},
};
