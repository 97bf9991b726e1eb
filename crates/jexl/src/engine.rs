//! Engine facade: parsing, caching, configuration, and the expression and
//! script handles evaluation runs through.

use std::{
    cell::{Cell, RefCell},
    num::NonZeroUsize,
    path::Path,
    rc::Rc,
    sync::{Arc, Mutex, MutexGuard},
};

use ahash::AHashMap;
use lru::LruCache;

use crate::{
    arithmetic::Arithmetic,
    ast::Node,
    context::{JexlContext, MapContext, Registers},
    debugger::Debugger,
    error::{ErrorKind, EvalResult, JexlError},
    interpreter::Interpreter,
    parser::Parser,
    uberspect::{RegistryUberspect, Uberspect},
    value::Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParseKind {
    Expression,
    Script,
}

impl ParseKind {
    /// Cache-key prefix; the same text parses to different roots as an
    /// expression and as a script.
    fn prefix(self) -> char {
        match self {
            Self::Expression => 'e',
            Self::Script => 's',
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub(crate) struct EngineCore {
    uberspect: Rc<dyn Uberspect>,
    silent: Cell<bool>,
    lenient: Cell<bool>,
    /// The parser keeps scratch state across parses and is not reentrant.
    parser: Mutex<Parser>,
    /// Optional bounded parse cache, source text to root AST.
    cache: Mutex<Option<LruCache<String, Arc<Node>>>>,
    /// Namespace prefix to function-providing host object.
    functions: RefCell<AHashMap<String, Value>>,
}

impl EngineCore {
    /// Trims surrounding whitespace and appends the trailing `;` the grammar
    /// expects of a statement.
    fn clean_source(src: &str) -> String {
        let trimmed = src.trim();
        let mut cleaned = String::with_capacity(trimmed.len() + 1);
        cleaned.push_str(trimmed);
        if !trimmed.ends_with(';') {
            cleaned.push(';');
        }
        cleaned
    }

    pub(crate) fn parse(&self, src: &str, kind: ParseKind) -> EvalResult<(String, Arc<Node>)> {
        let cleaned = Self::clean_source(src);
        let key = {
            let mut k = String::with_capacity(cleaned.len() + 1);
            k.push(kind.prefix());
            k.push_str(&cleaned);
            k
        };

        if let Some(cache) = lock(&self.cache).as_mut()
            && let Some(node) = cache.get(&key)
        {
            tracing::debug!(source = %cleaned, "parse cache hit");
            return Ok((cleaned, Arc::clone(node)));
        }

        let node = {
            let mut parser = lock(&self.parser);
            match kind {
                ParseKind::Expression => parser.parse_expression(&cleaned)?,
                ParseKind::Script => parser.parse_script(&cleaned)?,
            }
        };
        let node = Arc::new(node);
        if let Some(cache) = lock(&self.cache).as_mut() {
            cache.put(key, Arc::clone(&node));
        }
        Ok((cleaned, node))
    }

    /// Runs one evaluation activation over `node`, then applies the silent
    /// shim: recoverable failures become a logged warning and a null result,
    /// everything else is enriched with the debugger's pinpoint.
    pub(crate) fn eval_node(
        &self,
        node: &Node,
        context: &mut dyn JexlContext,
        registers: Option<&Registers>,
    ) -> EvalResult<Value> {
        let strict = !self.lenient.get();
        let silent = self.silent.get();
        let functions = self.functions.borrow();
        let mut interpreter = Interpreter {
            uberspect: self.uberspect.as_ref(),
            arithmetic: Arithmetic::new(strict),
            context,
            registers,
            functions: &functions,
            silent,
            strict,
        };
        match interpreter.interpret(node) {
            Ok(value) => Ok(value),
            Err(error) if silent && error.recoverable() => {
                tracing::warn!(error = %error, "silent evaluation failure, returning null");
                Ok(Value::Null)
            }
            Err(error) => Err(self.enrich(node, error)),
        }
    }

    /// Attaches the reconstructed-source pinpoint to an error that carries a
    /// cause span.
    fn enrich(&self, root: &Node, error: JexlError) -> JexlError {
        match error.span {
            Some(span) if error.pinpoint.is_none() => match Debugger::new().pinpoint(root, span) {
                Some(pin) => error.with_pinpoint(pin),
                None => error,
            },
            _ => error,
        }
    }
}

/// The engine: parses and caches source text, hands out [`Expression`] and
/// [`Script`] handles, and owns the configuration every activation inherits.
///
/// Cloning an engine clones the handle, not the state; both handles share the
/// same cache and configuration.
#[derive(Clone)]
pub struct Engine {
    core: Rc<EngineCore>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// An engine with an empty [`RegistryUberspect`], lenient arithmetic, no
    /// cache, and silent mode off.
    #[must_use]
    pub fn new() -> Self {
        Self::with_uberspect(Rc::new(RegistryUberspect::new()))
    }

    /// An engine resolving host members through the given uberspect.
    #[must_use]
    pub fn with_uberspect(uberspect: Rc<dyn Uberspect>) -> Self {
        Self {
            core: Rc::new(EngineCore {
                uberspect,
                silent: Cell::new(false),
                lenient: Cell::new(true),
                parser: Mutex::new(Parser::new()),
                cache: Mutex::new(None),
                functions: RefCell::new(AHashMap::new()),
            }),
        }
    }

    /// When silent, recoverable runtime errors log a warning and yield null
    /// instead of raising.
    pub fn set_silent(&self, silent: bool) {
        self.core.silent.set(silent);
    }

    pub fn silent(&self) -> bool {
        self.core.silent.get()
    }

    /// When lenient, null operands coerce to zero or the empty string; when
    /// strict they raise `NullOperand`.
    pub fn set_lenient(&self, lenient: bool) {
        self.core.lenient.set(lenient);
    }

    pub fn lenient(&self) -> bool {
        self.core.lenient.get()
    }

    /// Bounds the parse cache; a size of zero disables caching.
    pub fn set_cache(&self, size: usize) {
        *lock(&self.core.cache) = NonZeroUsize::new(size).map(LruCache::new);
    }

    /// Replaces the namespace-to-functions mapping used by `ns:name(…)`
    /// calls. The empty prefix serves bare `name(…)` calls.
    pub fn set_functions(&self, functions: impl IntoIterator<Item = (String, Value)>) {
        *self.core.functions.borrow_mut() = functions.into_iter().collect();
    }

    /// Parses a single-statement expression.
    pub fn create_expression(&self, src: &str) -> EvalResult<Expression> {
        let (source, node) = self.core.parse(src, ParseKind::Expression)?;
        Ok(Expression {
            source,
            node,
            core: Rc::clone(&self.core),
        })
    }

    /// Parses a script: a sequence of statements whose value is the last's.
    pub fn create_script(&self, src: &str) -> EvalResult<Script> {
        let (source, node) = self.core.parse(src, ParseKind::Script)?;
        Ok(Script {
            source,
            node,
            core: Rc::clone(&self.core),
        })
    }

    /// Reads and parses a script file.
    pub fn create_script_from_file(&self, path: impl AsRef<Path>) -> EvalResult<Script> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path).map_err(|source| {
            JexlError::new(ErrorKind::Io {
                path: path.display().to_string(),
                source,
            })
        })?;
        self.create_script(&src)
    }

    /// Evaluates `expr` as a property path on `bean` by splicing the bean
    /// through register `$0`, so the evaluator needs no special path.
    pub fn get_property(&self, context: Option<&mut dyn JexlContext>, bean: Value, expr: &str) -> EvalResult<Value> {
        let src = Self::property_source(expr, None);
        let (_, node) = self.core.parse(&src, ParseKind::Expression)?;
        let registers = Registers::for_property(bean, Value::Null);
        self.eval_with_registers(&node, context, &registers)
    }

    /// Assigns `value` through the property path `expr` on `bean`, splicing
    /// the bean and the value through registers `$0` and `$1`.
    pub fn set_property(
        &self,
        context: Option<&mut dyn JexlContext>,
        bean: Value,
        expr: &str,
        value: Value,
    ) -> EvalResult<()> {
        let src = Self::property_source(expr, Some("$1"));
        let (_, node) = self.core.parse(&src, ParseKind::Expression)?;
        let registers = Registers::for_property(bean, value);
        self.eval_with_registers(&node, context, &registers)?;
        Ok(())
    }

    fn property_source(expr: &str, assign_from: Option<&str>) -> String {
        let expr = expr.trim();
        let mut src = String::with_capacity(expr.len() + 8);
        src.push_str("$0");
        if !expr.starts_with('[') {
            src.push('.');
        }
        src.push_str(expr);
        if let Some(rhs) = assign_from {
            src.push_str(" = ");
            src.push_str(rhs);
        }
        src
    }

    fn eval_with_registers(
        &self,
        node: &Node,
        context: Option<&mut dyn JexlContext>,
        registers: &Registers,
    ) -> EvalResult<Value> {
        match context {
            Some(ctx) => self.core.eval_node(node, ctx, Some(registers)),
            None => {
                let mut scratch = MapContext::new();
                self.core.eval_node(node, &mut scratch, Some(registers))
            }
        }
    }

    pub(crate) fn core(&self) -> &Rc<EngineCore> {
        &self.core
    }
}

/// A parsed single-statement expression bound to the engine that produced it.
pub struct Expression {
    source: String,
    node: Arc<Node>,
    core: Rc<EngineCore>,
}

impl std::fmt::Debug for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Expression")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl Expression {
    /// The cleaned source text this expression was parsed from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The root AST node, e.g. for [`crate::Debugger`] rendering.
    #[must_use]
    pub fn ast(&self) -> &Node {
        &self.node
    }

    /// Evaluates against the context. The context is only borrowed for the
    /// duration of the call.
    pub fn evaluate(&self, context: &mut dyn JexlContext) -> EvalResult<Value> {
        self.core.eval_node(&self.node, context, None)
    }
}

/// A parsed script; executing it yields the value of its last statement.
pub struct Script {
    source: String,
    node: Arc<Node>,
    core: Rc<EngineCore>,
}

impl std::fmt::Debug for Script {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Script")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl Script {
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The root AST node, e.g. for [`crate::Debugger`] rendering.
    #[must_use]
    pub fn ast(&self) -> &Node {
        &self.node
    }

    pub fn execute(&self, context: &mut dyn JexlContext) -> EvalResult<Value> {
        self.core.eval_node(&self.node, context, None)
    }
}
