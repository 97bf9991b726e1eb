//! Unified-EL style template engine.
//!
//! A template weaves literal text with immediate `${…}` and deferred `#{…}`
//! sub-expressions. Parsing produces a [`TemplateExpr`]; evaluation is
//! two-phase: `prepare` resolves the immediate parts against one context,
//! `evaluate` resolves what remains against another (possibly later, possibly
//! different) context.

use std::{
    fmt::{self, Display, Write},
    num::NonZeroUsize,
    rc::Rc,
    sync::{Mutex, MutexGuard},
};

use lru::LruCache;

use crate::{
    ast::Node,
    context::JexlContext,
    engine::{Engine, ParseKind},
    error::{ErrorKind, EvalResult, JexlError},
    value::Value,
};

/// A parsed JEXL sub-expression of a template.
#[derive(Debug)]
pub struct SubExpr {
    source: String,
    node: std::sync::Arc<Node>,
}

/// A deferred sub-expression whose body still contains `${…}` parts; the body
/// is kept raw until `prepare` resolves the immediates and re-parses it.
#[derive(Debug)]
pub struct NestedExpr {
    source: String,
}

/// A multi-part template. The `immediates`/`deferreds` counters drive the
/// prepare strategy; `source` points back at the pre-prepare form, so a
/// composite with `source` set is a prepared one.
#[derive(Debug)]
pub struct Composite {
    children: Vec<Rc<TemplateExpr>>,
    immediates: usize,
    deferreds: usize,
    source: Option<Rc<TemplateExpr>>,
}

/// A unified template expression.
#[derive(Debug)]
pub enum TemplateExpr {
    /// Literal text, or an immediate's value captured during `prepare`.
    Constant(Value),
    /// `${…}`, evaluated at prepare time.
    Immediate(SubExpr),
    /// `#{…}`, evaluated at evaluate time.
    Deferred(SubExpr),
    /// `#{… ${…} …}`, needing both phases.
    Nested(NestedExpr),
    /// Interleaved parts.
    Composite(Composite),
}

impl TemplateExpr {
    #[must_use]
    pub fn is_immediate(&self) -> bool {
        match self {
            Self::Immediate(_) | Self::Constant(_) => true,
            Self::Deferred(_) | Self::Nested(_) => false,
            Self::Composite(c) => c.deferreds == 0,
        }
    }

    #[must_use]
    pub fn is_deferred(&self) -> bool {
        !self.is_immediate()
    }

    /// The pre-prepare form of a prepared composite.
    #[must_use]
    pub fn source_expr(&self) -> Option<&Rc<TemplateExpr>> {
        match self {
            Self::Composite(c) => c.source.as_ref(),
            _ => None,
        }
    }

    fn counts(children: &[Rc<TemplateExpr>]) -> (usize, usize) {
        let mut immediates = 0;
        let mut deferreds = 0;
        for child in children {
            match child.as_ref() {
                Self::Immediate(_) => immediates += 1,
                Self::Deferred(_) | Self::Nested(_) => deferreds += 1,
                Self::Composite(c) => {
                    immediates += c.immediates;
                    deferreds += c.deferreds;
                }
                Self::Constant(_) => {}
            }
        }
        (immediates, deferreds)
    }
}

impl Display for TemplateExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(value) => f.write_str(&value.display_string()),
            Self::Immediate(sub) => write!(f, "${{{}}}", sub.source),
            Self::Deferred(sub) => write!(f, "#{{{}}}", sub.source),
            Self::Nested(nested) => write!(f, "#{{{}}}", nested.source),
            Self::Composite(composite) => {
                for child in &composite.children {
                    Display::fmt(child, f)?;
                }
                Ok(())
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// The template engine. Sits above a shared [`Engine`], which parses and
/// evaluates the individual sub-expressions.
pub struct TemplateEngine {
    engine: Engine,
    cache: Mutex<Option<LruCache<String, Rc<TemplateExpr>>>>,
}

impl TemplateEngine {
    #[must_use]
    pub fn new(engine: &Engine) -> Self {
        Self {
            engine: engine.clone(),
            cache: Mutex::new(None),
        }
    }

    /// Bounds the template cache; zero disables it.
    pub fn set_cache(&self, size: usize) {
        *lock(&self.cache) = NonZeroUsize::new(size).map(LruCache::new);
    }

    /// Parses a unified template. Successful parses are cached by source.
    pub fn parse(&self, source: &str) -> EvalResult<Rc<TemplateExpr>> {
        if let Some(cache) = lock(&self.cache).as_mut()
            && let Some(expr) = cache.get(source)
        {
            tracing::debug!(source, "template cache hit");
            return Ok(Rc::clone(expr));
        }
        let expr = self.parse_composite(source)?;
        if let Some(cache) = lock(&self.cache).as_mut() {
            cache.put(source.to_owned(), Rc::clone(&expr));
        }
        Ok(expr)
    }

    /// First phase: resolves immediate parts against `context`, returning the
    /// same expression when nothing changed.
    pub fn prepare(&self, expr: &Rc<TemplateExpr>, context: &mut dyn JexlContext) -> EvalResult<Rc<TemplateExpr>> {
        match expr.as_ref() {
            TemplateExpr::Constant(_) | TemplateExpr::Immediate(_) | TemplateExpr::Deferred(_) => Ok(Rc::clone(expr)),
            TemplateExpr::Nested(nested) => self.prepare_nested(nested, context),
            TemplateExpr::Composite(composite) => {
                if composite.immediates == 0 || composite.deferreds == 0 {
                    return Ok(Rc::clone(expr));
                }
                let mut changed = false;
                let mut prepared_children = Vec::with_capacity(composite.children.len());
                for child in &composite.children {
                    if let TemplateExpr::Immediate(sub) = child.as_ref() {
                        let value = self.eval_sub(sub, context)?;
                        changed = true;
                        // null immediates drop out of the prepared form
                        if !value.is_null() {
                            prepared_children.push(Rc::new(TemplateExpr::Constant(value)));
                        }
                        continue;
                    }
                    let prepared = self.prepare(child, context)?;
                    changed |= !Rc::ptr_eq(&prepared, child);
                    prepared_children.push(prepared);
                }
                if !changed {
                    return Ok(Rc::clone(expr));
                }
                let (immediates, deferreds) = TemplateExpr::counts(&prepared_children);
                Ok(Rc::new(TemplateExpr::Composite(Composite {
                    children: prepared_children,
                    immediates,
                    deferreds,
                    source: Some(Rc::clone(expr)),
                })))
            }
        }
    }

    /// Second phase: produces the template's value. Composites concatenate
    /// the string image of each part, skipping nulls.
    pub fn evaluate(&self, expr: &Rc<TemplateExpr>, context: &mut dyn JexlContext) -> EvalResult<Value> {
        match expr.as_ref() {
            TemplateExpr::Constant(value) => Ok(value.clone()),
            TemplateExpr::Immediate(sub) | TemplateExpr::Deferred(sub) => self.eval_sub(sub, context),
            TemplateExpr::Nested(_) => {
                let prepared = self.prepare(expr, context)?;
                self.evaluate(&prepared, context)
            }
            TemplateExpr::Composite(composite) => {
                let mut out = String::new();
                for child in &composite.children {
                    let value = self.evaluate(child, context)?;
                    if !value.is_null() {
                        let _ = write!(out, "{}", value.display_string());
                    }
                }
                Ok(Value::Str(out))
            }
        }
    }

    /// A nested deferred prepares by evaluating its body as an inner template
    /// (resolving the `${…}` parts) and re-parsing the result as a plain
    /// deferred sub-expression.
    fn prepare_nested(&self, nested: &NestedExpr, context: &mut dyn JexlContext) -> EvalResult<Rc<TemplateExpr>> {
        let inner = self.parse_composite(&nested.source)?;
        let resolved = self.evaluate(&inner, context)?.display_string();
        let sub = self.parse_sub(&resolved)?;
        Ok(Rc::new(TemplateExpr::Deferred(sub)))
    }

    fn eval_sub(&self, sub: &SubExpr, context: &mut dyn JexlContext) -> EvalResult<Value> {
        self.engine
            .core()
            .eval_node(&sub.node, context, None)
            .map_err(|cause| self.wrap(&sub.source, cause))
    }

    fn parse_sub(&self, source: &str) -> EvalResult<SubExpr> {
        match self.engine.core().parse(source, ParseKind::Expression) {
            Ok((cleaned_source, node)) => Ok(SubExpr {
                source: cleaned_source,
                node,
            }),
            Err(cause) => Err(self.wrap(source, cause)),
        }
    }

    fn wrap(&self, source: &str, cause: JexlError) -> JexlError {
        JexlError::new(ErrorKind::Template {
            expr: source.to_owned(),
            cause: Box::new(cause),
        })
    }

    /// The six-state composite parser. The working buffer grows to the size
    /// of the input only.
    fn parse_composite(&self, source: &str) -> EvalResult<Rc<TemplateExpr>> {
        #[derive(Clone, Copy, PartialEq)]
        enum State {
            Const,
            Immediate0,
            Deferred0,
            Immediate1,
            Deferred1,
            Escape,
        }

        let chars: Vec<char> = source.chars().collect();
        let mut exprs: Vec<Rc<TemplateExpr>> = Vec::new();
        let mut buffer = String::new();
        let mut state = State::Const;
        let mut expr_start = 0usize;
        let mut inner = 0usize;
        let mut nested = false;

        let flush_constant = |buffer: &mut String, exprs: &mut Vec<Rc<TemplateExpr>>| {
            if !buffer.is_empty() {
                exprs.push(Rc::new(TemplateExpr::Constant(Value::Str(std::mem::take(buffer)))));
            }
        };

        let mut i = 0usize;
        while i < chars.len() {
            let c = chars[i];
            match state {
                State::Const => match c {
                    '$' => state = State::Immediate0,
                    '#' => {
                        state = State::Deferred0;
                        expr_start = i;
                    }
                    '\\' => state = State::Escape,
                    _ => buffer.push(c),
                },
                State::Immediate0 => {
                    if c == '{' {
                        flush_constant(&mut buffer, &mut exprs);
                        expr_start = i - 1;
                        state = State::Immediate1;
                    } else {
                        buffer.push('$');
                        buffer.push(c);
                        state = State::Const;
                    }
                }
                State::Deferred0 => {
                    if c == '{' {
                        flush_constant(&mut buffer, &mut exprs);
                        state = State::Deferred1;
                        inner = 0;
                        nested = false;
                    } else {
                        buffer.push('#');
                        buffer.push(c);
                        state = State::Const;
                    }
                }
                State::Immediate1 => {
                    if c == '}' {
                        let sub = self.parse_sub(&std::mem::take(&mut buffer))?;
                        exprs.push(Rc::new(TemplateExpr::Immediate(sub)));
                        state = State::Const;
                    } else {
                        buffer.push(c);
                    }
                }
                State::Deferred1 => match c {
                    '"' | '\'' => {
                        // copy a string literal through verbatim, honoring
                        // backslash escapes
                        let quote = c;
                        buffer.push(c);
                        i += 1;
                        while i < chars.len() {
                            let s = chars[i];
                            buffer.push(s);
                            if s == '\\' && i + 1 < chars.len() {
                                i += 1;
                                buffer.push(chars[i]);
                            } else if s == quote {
                                break;
                            }
                            i += 1;
                        }
                    }
                    '$' if chars.get(i + 1) == Some(&'{') => {
                        inner += 1;
                        nested = true;
                        buffer.push_str("${");
                        i += 1;
                    }
                    '}' => {
                        if inner > 0 {
                            inner -= 1;
                            buffer.push('}');
                        } else {
                            let body = std::mem::take(&mut buffer);
                            let expr = if nested {
                                Rc::new(TemplateExpr::Nested(NestedExpr { source: body }))
                            } else {
                                Rc::new(TemplateExpr::Deferred(self.parse_sub(&body)?))
                            };
                            exprs.push(expr);
                            state = State::Const;
                        }
                    }
                    _ => buffer.push(c),
                },
                State::Escape => {
                    if c == '#' || c == '$' {
                        buffer.push(c);
                    } else {
                        buffer.push('\\');
                        buffer.push(c);
                    }
                    state = State::Const;
                }
            }
            i += 1;
        }

        match state {
            State::Const => {}
            State::Immediate0 => buffer.push('$'),
            State::Deferred0 => buffer.push('#'),
            State::Escape => buffer.push('\\'),
            State::Immediate1 | State::Deferred1 => {
                return Err(JexlError::new(ErrorKind::MalformedTemplate { position: expr_start }));
            }
        }
        flush_constant(&mut buffer, &mut exprs);

        if exprs.is_empty() {
            return Ok(Rc::new(TemplateExpr::Constant(Value::Str(String::new()))));
        }
        if exprs.len() == 1
            && let Some(single) = exprs.pop()
        {
            return Ok(single);
        }
        let (immediates, deferreds) = TemplateExpr::counts(&exprs);
        Ok(Rc::new(TemplateExpr::Composite(Composite {
            children: exprs,
            immediates,
            deferreds,
            source: None,
        })))
    }
}
