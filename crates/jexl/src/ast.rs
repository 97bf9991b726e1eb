use strum::IntoStaticStr;

/// Character offsets `[begin, end)` of a node within its source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub begin: usize,
    pub end: usize,
}

impl Span {
    #[must_use]
    pub fn new(begin: usize, end: usize) -> Self {
        Self { begin, end }
    }

    /// The smallest span covering both operands.
    #[must_use]
    pub fn cover(self, other: Self) -> Self {
        Self {
            begin: self.begin.min(other.begin),
            end: self.end.max(other.end),
        }
    }
}

/// The variant tag of an AST node.
///
/// Nodes do not own an evaluation strategy; the interpreter dispatches on this
/// tag and the debugger renders from it. Operator variants carry their
/// canonical symbol through the strum derive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum NodeKind {
    /// Root of a parsed script; children are its statements.
    Script,
    /// `{ … }` statement block.
    Block,
    /// `if (cond) then [else alt]`; 2 or 3 children.
    IfStatement,
    /// `while (cond) body`; exactly 2 children.
    WhileStatement,
    /// `foreach (var in iterable) body`; exactly 3 children: the loop
    /// variable reference, the iterable expression, the body statement.
    ForeachStatement,
    /// `target = value`; exactly 2 children.
    Assignment,

    // logical
    Or,
    And,
    Not,

    // comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    // arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    UnaryMinus,

    // bitwise
    BitAnd,
    BitOr,
    BitXor,
    BitNot,

    // literals; the lexeme is kept in `image`
    IntLit,
    FloatLit,
    StrLit,
    TrueLit,
    FalseLit,
    NullLit,

    /// A bare name; `image` holds it. Inside a `Reference` an identifier is a
    /// context lookup or a property access depending on the walked data.
    Identifier,

    /// `{ k : v, … }` map literal; children are `MapEntry` nodes.
    MapLit,
    /// One `k : v` pair; exactly 2 children.
    MapEntry,
    /// Indexed access; first child is the base, the rest are successive
    /// index/key expressions.
    ArrayAccess,

    /// A dereference chain `a.b[i].c()`; children are walked left to right,
    /// each feeding its value to the next.
    Reference,
    /// Expression-handle root wrapping a reference.
    ReferenceExpression,
    /// Expression-handle root wrapping an arithmetic/logical expression.
    ExpressionExpression,
    /// Expression-handle root wrapping a statement.
    StatementExpression,

    /// `size(x)` builtin; exactly 1 child.
    SizeFn,
    /// `.size()` at the end of a reference chain; no children.
    SizeMethod,
    /// `empty(x)` builtin; exactly 1 child.
    EmptyFn,
    /// Method call element of a reference chain; first child is the name
    /// identifier (possibly `ns:name`), the rest are arguments.
    Method,
}

impl NodeKind {
    /// Canonical rendering of binary and unary operator variants.
    #[must_use]
    pub fn operator_symbol(self) -> Option<&'static str> {
        Some(match self {
            Self::Or => "||",
            Self::And => "&&",
            Self::Not => "!",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::UnaryMinus => "-",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::BitNot => "~",
            _ => return None,
        })
    }

    #[must_use]
    pub fn is_binary_operator(self) -> bool {
        matches!(
            self,
            Self::Or
                | Self::And
                | Self::Eq
                | Self::Ne
                | Self::Lt
                | Self::Le
                | Self::Gt
                | Self::Ge
                | Self::Add
                | Self::Sub
                | Self::Mul
                | Self::Div
                | Self::Mod
                | Self::BitAnd
                | Self::BitOr
                | Self::BitXor
        )
    }

    #[must_use]
    pub fn is_unary_operator(self) -> bool {
        matches!(self, Self::Not | Self::UnaryMinus | Self::BitNot)
    }

    /// Whether a child count satisfies this variant's arity invariant.
    #[must_use]
    pub fn arity_ok(self, children: usize) -> bool {
        match self {
            Self::Script | Self::Block | Self::MapLit => true,
            Self::IfStatement => children == 2 || children == 3,
            Self::WhileStatement | Self::Assignment | Self::MapEntry => children == 2,
            Self::ForeachStatement => children == 3,
            k if k.is_binary_operator() => children == 2,
            k if k.is_unary_operator() => children == 1,
            Self::IntLit
            | Self::FloatLit
            | Self::StrLit
            | Self::TrueLit
            | Self::FalseLit
            | Self::NullLit
            | Self::Identifier
            | Self::SizeMethod => children == 0,
            Self::ArrayAccess => children >= 2,
            Self::Reference | Self::Method => children >= 1,
            Self::ReferenceExpression | Self::ExpressionExpression | Self::StatementExpression => children == 1,
            Self::SizeFn | Self::EmptyFn => children == 1,
            _ => true,
        }
    }
}

/// One AST node: a variant tag, ordered children, an optional literal image
/// (identifier, string, or number lexeme) and a source span.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub children: Vec<Node>,
    pub image: Option<Box<str>>,
    pub span: Span,
}

impl Node {
    #[must_use]
    pub fn leaf(kind: NodeKind, span: Span) -> Self {
        debug_assert!(kind.arity_ok(0), "{kind:?} is not a leaf");
        Self {
            kind,
            children: Vec::new(),
            image: None,
            span,
        }
    }

    #[must_use]
    pub fn with_image(kind: NodeKind, image: impl Into<Box<str>>, span: Span) -> Self {
        Self {
            kind,
            children: Vec::new(),
            image: Some(image.into()),
            span,
        }
    }

    #[must_use]
    pub fn with_children(kind: NodeKind, children: Vec<Node>, span: Span) -> Self {
        debug_assert!(kind.arity_ok(children.len()), "bad arity {} for {kind:?}", children.len());
        Self {
            kind,
            children,
            image: None,
            span,
        }
    }

    /// The node's literal image, or the empty string for imageless nodes.
    #[must_use]
    pub fn image_str(&self) -> &str {
        self.image.as_deref().unwrap_or("")
    }
}
