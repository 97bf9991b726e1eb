//! Tree-walking evaluator.
//!
//! An activation is stateless with respect to the AST: the same tree may be
//! walked by any number of independent activations, each bound to its own
//! context. Dispatch is post-order except where short-circuit semantics apply
//! (`&&`, `||`, `if`, `while`, `foreach`).

use std::str::FromStr;

use ahash::AHashMap;
use num_bigint::BigInt;
use smallvec::SmallVec;

use crate::{
    arithmetic::Arithmetic,
    ast::{Node, NodeKind, Span},
    context::{JexlContext, Registers},
    error::{ErrorKind, EvalResult, JexlError},
    uberspect::Uberspect,
    value::Value,
};

/// One evaluation activation: the collaborators and flags a walk runs with.
/// Never retained after the walk returns.
pub(crate) struct Interpreter<'a> {
    pub uberspect: &'a dyn Uberspect,
    pub arithmetic: Arithmetic,
    pub context: &'a mut dyn JexlContext,
    pub registers: Option<&'a Registers>,
    pub functions: &'a AHashMap<String, Value>,
    pub silent: bool,
    pub strict: bool,
}

impl Interpreter<'_> {
    pub fn interpret(&mut self, node: &Node) -> EvalResult<Value> {
        self.eval(node)
    }

    fn eval(&mut self, node: &Node) -> EvalResult<Value> {
        let span = node.span;
        match node.kind {
            NodeKind::Script | NodeKind::Block => {
                let mut result = Value::Null;
                for child in &node.children {
                    result = self.eval(child)?;
                }
                Ok(result)
            }
            NodeKind::ReferenceExpression | NodeKind::ExpressionExpression | NodeKind::StatementExpression => {
                self.eval(&node.children[0])
            }

            NodeKind::IfStatement => {
                let condition = self.eval(&node.children[0])?;
                if self.arithmetic.to_bool(&condition).map_err(|e| e.at(node.children[0].span))? {
                    self.eval(&node.children[1])
                } else if let Some(alt) = node.children.get(2) {
                    self.eval(alt)
                } else {
                    Ok(Value::Null)
                }
            }
            NodeKind::WhileStatement => {
                let mut result = Value::Null;
                loop {
                    let condition = self.eval(&node.children[0])?;
                    if !self.arithmetic.to_bool(&condition).map_err(|e| e.at(node.children[0].span))? {
                        break;
                    }
                    result = self.eval(&node.children[1])?;
                }
                Ok(result)
            }
            NodeKind::ForeachStatement => self.eval_foreach(node),
            NodeKind::Assignment => self.eval_assignment(node),

            NodeKind::Or => {
                let left = self.eval(&node.children[0])?;
                if self.arithmetic.to_bool(&left).map_err(|e| e.at(span))? {
                    return Ok(Value::Bool(true));
                }
                let right = self.eval(&node.children[1])?;
                Ok(Value::Bool(self.arithmetic.to_bool(&right).map_err(|e| e.at(span))?))
            }
            NodeKind::And => {
                let left = self.eval(&node.children[0])?;
                if !self.arithmetic.to_bool(&left).map_err(|e| e.at(span))? {
                    return Ok(Value::Bool(false));
                }
                let right = self.eval(&node.children[1])?;
                Ok(Value::Bool(self.arithmetic.to_bool(&right).map_err(|e| e.at(span))?))
            }
            NodeKind::Not => {
                let operand = self.eval(&node.children[0])?;
                if operand.is_null() {
                    return Err(JexlError::new(ErrorKind::NullOperand).at(span));
                }
                self.arithmetic.not(&operand).map_err(|e| e.at(span))
            }

            NodeKind::Eq | NodeKind::Ne | NodeKind::Lt | NodeKind::Le | NodeKind::Gt | NodeKind::Ge => {
                let left = self.eval(&node.children[0])?;
                let right = self.eval(&node.children[1])?;
                let result = match node.kind {
                    NodeKind::Eq => self.arithmetic.eq(&left, &right),
                    NodeKind::Ne => self.arithmetic.ne(&left, &right),
                    NodeKind::Lt => self.arithmetic.lt(&left, &right),
                    NodeKind::Le => self.arithmetic.le(&left, &right),
                    NodeKind::Gt => self.arithmetic.gt(&left, &right),
                    _ => self.arithmetic.ge(&left, &right),
                };
                Ok(Value::Bool(result.map_err(|e| e.at(span))?))
            }

            NodeKind::Add | NodeKind::Sub | NodeKind::Mul | NodeKind::Div | NodeKind::Mod => {
                let left = self.eval(&node.children[0])?;
                let right = self.eval(&node.children[1])?;
                let result = match node.kind {
                    NodeKind::Add => self.arithmetic.add(&left, &right),
                    NodeKind::Sub => self.arithmetic.sub(&left, &right),
                    NodeKind::Mul => self.arithmetic.mul(&left, &right),
                    NodeKind::Div => self.arithmetic.div(&left, &right),
                    _ => self.arithmetic.rem(&left, &right),
                };
                result.map_err(|e| e.at(span))
            }
            NodeKind::UnaryMinus => {
                let operand = self.eval(&node.children[0])?;
                self.arithmetic.neg(&operand).map_err(|e| e.at(span))
            }
            NodeKind::BitAnd | NodeKind::BitOr | NodeKind::BitXor => {
                let left = self.eval(&node.children[0])?;
                let right = self.eval(&node.children[1])?;
                let result = match node.kind {
                    NodeKind::BitAnd => self.arithmetic.bit_and(&left, &right),
                    NodeKind::BitOr => self.arithmetic.bit_or(&left, &right),
                    _ => self.arithmetic.bit_xor(&left, &right),
                };
                result.map_err(|e| e.at(span))
            }
            NodeKind::BitNot => {
                let operand = self.eval(&node.children[0])?;
                self.arithmetic.bit_not(&operand).map_err(|e| e.at(span))
            }

            NodeKind::IntLit => Ok(int_literal(node.image_str())),
            NodeKind::FloatLit => node
                .image_str()
                .parse::<f64>()
                .map(Value::Float64)
                .map_err(|_| {
                    JexlError::new(ErrorKind::NumberFormat {
                        image: node.image_str().to_owned(),
                    })
                    .at(span)
                }),
            NodeKind::StrLit => Ok(Value::Str(node.image_str().to_owned())),
            NodeKind::TrueLit => Ok(Value::Bool(true)),
            NodeKind::FalseLit => Ok(Value::Bool(false)),
            NodeKind::NullLit => Ok(Value::Null),

            NodeKind::Identifier => Ok(self.variable_value(node.image_str())),
            NodeKind::Reference => self.eval_reference(node),
            NodeKind::ArrayAccess => self.ref_element_value(node, None),
            NodeKind::Method => self.eval_method(node, None),
            NodeKind::SizeMethod => Err(JexlError::new(ErrorKind::NoSuchMethod {
                name: "size".to_owned(),
            })
            .at(span)),

            NodeKind::MapLit => {
                let mut pairs = Vec::with_capacity(node.children.len());
                for entry in &node.children {
                    let key = self.eval(&entry.children[0])?;
                    let value = self.eval(&entry.children[1])?;
                    pairs.push((key, value));
                }
                Ok(Value::map_from(pairs))
            }
            NodeKind::MapEntry => self.eval(&node.children[1]),

            NodeKind::SizeFn => {
                let argument = self.eval(&node.children[0])?;
                let size = self.size_of(&argument, span)?;
                Ok(Value::Int32(size as i32))
            }
            NodeKind::EmptyFn => {
                let argument = self.eval(&node.children[0])?;
                Ok(Value::Bool(self.empty_of(&argument)))
            }
        }
    }

    /// Reads a name from the registers or the context. Missing names resolve
    /// to null here; strict-mode unknown-variable reporting happens at the
    /// end of the reference walk, once the dotted fallback has had its say.
    fn variable_value(&self, name: &str) -> Value {
        if let Some(registers) = self.registers
            && let Some(value) = registers.lookup(name)
        {
            return value.clone();
        }
        self.context.get(name).unwrap_or(Value::Null)
    }

    fn name_is_bound(&self, name: &str) -> bool {
        self.registers.is_some_and(|r| r.lookup(name).is_some()) || self.context.has(name)
    }

    /// Walks a dereference chain left to right, each element's value feeding
    /// the next as its data.
    fn eval_reference(&mut self, node: &Node) -> EvalResult<Value> {
        let mut data: Option<Value> = None;
        let mut all_identifiers = true;
        for child in &node.children {
            let value = self.ref_element_value(child, data.as_ref())?;
            all_identifiers &= child.kind == NodeKind::Identifier;
            data = Some(value);
        }
        let mut result = data.unwrap_or(Value::Null);

        if result.is_null() && all_identifiers {
            let dotted = dotted_name(node);
            // legacy flat-name lookup: `a.b.c` as one context variable
            if node.children.len() > 1
                && let Some(found) = self.context.get(&dotted)
            {
                result = found;
            }
            if result.is_null() && self.strict {
                let first = node.children[0].image_str();
                if !self.name_is_bound(first) && !self.context.has(&dotted) {
                    return Err(JexlError::new(ErrorKind::UnknownVariable { name: dotted }).at(node.span));
                }
            }
        }
        Ok(result)
    }

    /// Evaluates one chain element against the data accumulated so far.
    fn ref_element_value(&mut self, child: &Node, data: Option<&Value>) -> EvalResult<Value> {
        match child.kind {
            NodeKind::Identifier => match data {
                Some(d) if !d.is_null() => {
                    let key = Value::Str(child.image_str().to_owned());
                    self.get_attribute(d, &key, child.span)
                }
                // a null walk so far reads from the context instead
                _ => Ok(self.variable_value(child.image_str())),
            },
            NodeKind::ArrayAccess => {
                let base_node = &child.children[0];
                let mut value = self.ref_element_value(base_node, data)?;
                for index_node in &child.children[1..] {
                    let key = self.eval(index_node)?;
                    value = self.get_attribute(&value, &key, index_node.span)?;
                }
                Ok(value)
            }
            NodeKind::Method => self.eval_method(child, data.cloned()),
            NodeKind::SizeMethod => {
                let target = data.cloned().unwrap_or(Value::Null);
                let size = self.size_of(&target, child.span)?;
                Ok(Value::Int32(size as i32))
            }
            _ => self.eval(child),
        }
    }

    /// Method dispatch: namespaced names resolve through the `functions` map,
    /// plain names against the walked data object. A failed exact match is
    /// retried once with numerically narrowed arguments.
    fn eval_method(&mut self, node: &Node, target: Option<Value>) -> EvalResult<Value> {
        let span = node.span;
        let full_name = node.children[0].image_str().to_owned();
        let (namespace, name) = match full_name.split_once(':') {
            Some((ns, n)) => (Some(ns.to_owned()), n.to_owned()),
            None => (None, full_name.clone()),
        };

        let mut args: SmallVec<[Value; 4]> = SmallVec::with_capacity(node.children.len() - 1);
        for argument in &node.children[1..] {
            args.push(self.eval(argument)?);
        }

        let target = match namespace {
            Some(ns) => match self.functions.get(&ns) {
                Some(object) => object.clone(),
                None => return self.method_miss(&full_name, span),
            },
            None => match target {
                Some(object) => object,
                None => match self.functions.get("") {
                    Some(object) => object.clone(),
                    None => return self.method_miss(&full_name, span),
                },
            },
        };

        match self.uberspect.find_method(&target, &name, &args, span).map_err(|e| e.at(span))? {
            Some(handle) => self.uberspect.invoke(&handle, &target, &args, span).map_err(|e| e.at(span)),
            None => {
                let narrowed: SmallVec<[Value; 4]> = args.iter().map(|a| self.arithmetic.narrow(a)).collect();
                match self
                    .uberspect
                    .find_method(&target, &name, &narrowed, span)
                    .map_err(|e| e.at(span))?
                {
                    Some(handle) => self
                        .uberspect
                        .invoke(&handle, &target, &narrowed, span)
                        .map_err(|e| e.at(span)),
                    None => self.method_miss(&full_name, span),
                }
            }
        }
    }

    fn method_miss(&self, name: &str, span: Span) -> EvalResult<Value> {
        if self.silent {
            tracing::warn!(method = name, "unsolvable method, returning null");
            Ok(Value::Null)
        } else {
            Err(JexlError::new(ErrorKind::NoSuchMethod { name: name.to_owned() }).at(span))
        }
    }

    fn eval_assignment(&mut self, node: &Node) -> EvalResult<Value> {
        let target = &node.children[0];
        let value = self.eval(&node.children[1])?;
        if target.kind == NodeKind::Reference
            && target.children.len() == 1
            && target.children[0].kind == NodeKind::Identifier
        {
            let name = target.children[0].image_str();
            self.context.set(name, value.clone()).map_err(|e| e.at(node.span))?;
            return Ok(value);
        }
        // the engine's set_property helper splices its root through the
        // registers; only then is a longer chain an assignable target
        if target.kind == NodeKind::Reference && self.registers.is_some() {
            self.assign_reference(target, value.clone())?;
            return Ok(value);
        }
        Err(JexlError::new(ErrorKind::BadAssignment {
            detail: "only simple identifiers are assignable",
        })
        .at(node.span))
    }

    /// Assigns through a multi-element reference: walk everything but the
    /// last element, then set the final attribute or index.
    fn assign_reference(&mut self, node: &Node, value: Value) -> EvalResult<()> {
        let (last, prefix) = match node.children.split_last() {
            Some(split) => split,
            None => {
                return Err(JexlError::new(ErrorKind::BadAssignment {
                    detail: "empty assignment target",
                })
                .at(node.span));
            }
        };
        let mut data: Option<Value> = None;
        for child in prefix {
            let next = self.ref_element_value(child, data.as_ref())?;
            data = Some(next);
        }
        let object = data.unwrap_or(Value::Null);

        match last.kind {
            NodeKind::Identifier => {
                let key = Value::Str(last.image_str().to_owned());
                self.set_attribute(&object, &key, value, last.span)
            }
            NodeKind::ArrayAccess => {
                let base_node = &last.children[0];
                let mut object = self.ref_element_value(base_node, object_ref(&object))?;
                let (final_index, middle) = match last.children[1..].split_last() {
                    Some(split) => split,
                    None => {
                        return Err(JexlError::new(ErrorKind::BadAssignment {
                            detail: "indexed assignment needs an index",
                        })
                        .at(last.span));
                    }
                };
                for index_node in middle {
                    let key = self.eval(index_node)?;
                    object = self.get_attribute(&object, &key, index_node.span)?;
                }
                let key = self.eval(final_index)?;
                self.set_attribute(&object, &key, value, final_index.span)
            }
            _ => Err(JexlError::new(ErrorKind::BadAssignment {
                detail: "target is not assignable",
            })
            .at(last.span)),
        }
    }

    fn eval_foreach(&mut self, node: &Node) -> EvalResult<Value> {
        let variable = node.children[0].children[0].image_str().to_owned();
        let iterable = self.eval(&node.children[1])?;
        let mut result = Value::Null;
        if iterable.is_null() {
            return Ok(result);
        }
        if let Some(iterator) = self
            .uberspect
            .get_iterator(&iterable, node.children[1].span)
            .map_err(|e| e.at(node.children[1].span))?
        {
            for item in iterator {
                self.context.set(&variable, item).map_err(|e| e.at(node.span))?;
                result = self.eval(&node.children[2])?;
            }
        }
        Ok(result)
    }

    /// Attribute access: keyed lookup on maps, integer indexing on sequences
    /// and strings, uberspect properties for everything else. Null on either
    /// side short-circuits to null.
    fn get_attribute(&mut self, object: &Value, attribute: &Value, span: Span) -> EvalResult<Value> {
        if object.is_null() || attribute.is_null() {
            return Ok(Value::Null);
        }
        match object {
            Value::Map(map) => Ok(map.borrow().get(attribute).cloned().unwrap_or(Value::Null)),
            Value::Seq(seq) => {
                let index = self.arithmetic.to_i32(attribute).map_err(|e| e.at(span))?;
                let seq = seq.borrow();
                match usize::try_from(index).ok().and_then(|i| seq.get(i)) {
                    Some(element) => Ok(element.clone()),
                    None => self.index_miss(i64::from(index), span),
                }
            }
            Value::Str(s) => {
                let index = self.arithmetic.to_i32(attribute).map_err(|e| e.at(span))?;
                match usize::try_from(index).ok().and_then(|i| s.chars().nth(i)) {
                    Some(c) => Ok(Value::Char(c)),
                    None => self.index_miss(i64::from(index), span),
                }
            }
            _ => self.uberspect.get_property(object, attribute, span).map_err(|e| e.at(span)),
        }
    }

    fn index_miss(&self, index: i64, span: Span) -> EvalResult<Value> {
        if self.strict {
            Err(JexlError::new(ErrorKind::IndexOutOfRange { index }).at(span))
        } else {
            Ok(Value::Null)
        }
    }

    fn set_attribute(&mut self, object: &Value, attribute: &Value, value: Value, span: Span) -> EvalResult<()> {
        match object {
            Value::Map(map) => {
                map.borrow_mut().insert(attribute.clone(), value);
                Ok(())
            }
            Value::Seq(seq) => {
                let index = self.arithmetic.to_i32(attribute).map_err(|e| e.at(span))?;
                let mut seq = seq.borrow_mut();
                match usize::try_from(index).ok().filter(|i| *i < seq.len()) {
                    Some(i) => {
                        seq[i] = value;
                        Ok(())
                    }
                    None => Err(JexlError::new(ErrorKind::IndexOutOfRange {
                        index: i64::from(index),
                    })
                    .at(span)),
                }
            }
            Value::Host(_) => self.uberspect.set_property(object, attribute, value, span).map_err(|e| e.at(span)),
            _ => Err(JexlError::new(ErrorKind::BadAssignment {
                detail: "value does not accept properties",
            })
            .at(span)),
        }
    }

    /// `size()` over strings, sequences, maps, and host objects exposing a
    /// size method or length.
    fn size_of(&mut self, value: &Value, span: Span) -> EvalResult<i64> {
        match value {
            Value::Str(s) => Ok(s.chars().count() as i64),
            Value::Seq(seq) => Ok(seq.borrow().len() as i64),
            Value::Map(map) => Ok(map.borrow().len() as i64),
            Value::Host(object) => {
                if let Some(len) = object.len() {
                    return Ok(len as i64);
                }
                if let Some(handle) = self
                    .uberspect
                    .find_method(value, "size", &[], span)
                    .map_err(|e| e.at(span))?
                {
                    let result = self.uberspect.invoke(&handle, value, &[], span).map_err(|e| e.at(span))?;
                    return self.arithmetic.to_i64(&result).map_err(|e| e.at(span));
                }
                Err(JexlError::new(ErrorKind::TypeCoercion {
                    from: value.kind(),
                    to: "a sized value",
                })
                .at(span))
            }
            _ => Err(JexlError::new(ErrorKind::TypeCoercion {
                from: value.kind(),
                to: "a sized value",
            })
            .at(span)),
        }
    }

    /// Emptiness: null, the empty string, an empty sequence or map, or a
    /// zero-sized host object. Everything else is non-empty.
    fn empty_of(&mut self, value: &Value) -> bool {
        match value {
            Value::Null => true,
            Value::Str(s) => s.is_empty(),
            Value::Seq(seq) => seq.borrow().is_empty(),
            Value::Map(map) => map.borrow().is_empty(),
            Value::Host(object) => object.len().is_some_and(|len| len == 0),
            _ => false,
        }
    }
}

fn object_ref(value: &Value) -> Option<&Value> {
    if value.is_null() { None } else { Some(value) }
}

fn dotted_name(reference: &Node) -> String {
    let mut out = String::new();
    for (i, child) in reference.children.iter().enumerate() {
        if i > 0 {
            out.push('.');
        }
        out.push_str(child.image_str());
    }
    out
}

/// Integer literals take the smallest variant that holds the lexeme: int,
/// long, then big integer.
fn int_literal(image: &str) -> Value {
    if let Ok(v) = image.parse::<i32>() {
        return Value::Int32(v);
    }
    if let Ok(v) = image.parse::<i64>() {
        return Value::Int64(v);
    }
    match BigInt::from_str(image) {
        Ok(big) => Value::BigInt(big),
        Err(_) => Value::Null,
    }
}
