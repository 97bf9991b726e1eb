//! Reconstructs canonical JEXL source from an AST.
//!
//! The rendering doubles as a diagnostic tool: given the span of a failing
//! node, the debugger reports the node's offsets within the reconstructed
//! text, which the error display turns into `@[begin,end]: substring`.

use crate::{
    ast::{Node, NodeKind, Span},
    error::Pinpoint,
};

/// Operator precedence for minimal re-parenthesization; higher binds tighter.
fn precedence(kind: NodeKind) -> Option<u8> {
    Some(match kind {
        NodeKind::Or => 1,
        NodeKind::And => 2,
        NodeKind::Eq | NodeKind::Ne => 3,
        NodeKind::Lt | NodeKind::Le | NodeKind::Gt | NodeKind::Ge => 4,
        NodeKind::Add | NodeKind::Sub => 5,
        NodeKind::Mul | NodeKind::Div | NodeKind::Mod => 6,
        NodeKind::Not | NodeKind::UnaryMinus | NodeKind::BitNot => 7,
        NodeKind::BitOr => 8,
        NodeKind::BitXor => 9,
        NodeKind::BitAnd => 10,
        _ => return None,
    })
}

fn needs_semicolon(kind: NodeKind) -> bool {
    !matches!(
        kind,
        NodeKind::Block | NodeKind::IfStatement | NodeKind::WhileStatement | NodeKind::ForeachStatement
    )
}

/// Renders ASTs back to canonical source and locates nodes within the result.
#[derive(Debug, Default)]
pub struct Debugger {
    buffer: String,
    target: Option<Span>,
    start: usize,
    end: usize,
    found: bool,
}

impl Debugger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconstructs the canonical source of `node`.
    pub fn render(&mut self, node: &Node) -> String {
        self.reset(None);
        self.write_node(node);
        std::mem::take(&mut self.buffer)
    }

    /// Reconstructs the source of `root` and reports where the node carrying
    /// `cause` lands in it. Returns `None` when no node has that span.
    pub fn pinpoint(&mut self, root: &Node, cause: Span) -> Option<Pinpoint> {
        self.reset(Some(cause));
        self.write_node(root);
        if self.found {
            Some(Pinpoint {
                start: self.start,
                end: self.end,
                snippet: self.buffer[self.start..self.end].to_owned(),
            })
        } else {
            None
        }
    }

    fn reset(&mut self, target: Option<Span>) {
        self.buffer.clear();
        self.target = target;
        self.start = 0;
        self.end = 0;
        self.found = false;
    }

    fn write_node(&mut self, node: &Node) {
        let tracking = !self.found && self.target.is_some_and(|t| t == node.span);
        let start = self.buffer.len();
        self.write_inner(node);
        if tracking && !self.found {
            self.start = start;
            self.end = self.buffer.len();
            self.found = true;
        }
    }

    fn write_statement(&mut self, node: &Node) {
        self.write_node(node);
        if needs_semicolon(node.kind) {
            self.buffer.push(';');
        }
    }

    fn write_operand(&mut self, parent: NodeKind, child: &Node, right_side: bool) {
        let wrap = match (precedence(parent), precedence(child.kind)) {
            (Some(p), Some(c)) => {
                if right_side && child.kind.is_binary_operator() {
                    c <= p
                } else {
                    c < p
                }
            }
            _ => false,
        };
        if wrap {
            self.buffer.push('(');
            self.write_node(child);
            self.buffer.push(')');
        } else {
            self.write_node(child);
        }
    }

    fn write_inner(&mut self, node: &Node) {
        match node.kind {
            NodeKind::Script => {
                for (i, child) in node.children.iter().enumerate() {
                    if i > 0 {
                        self.buffer.push(' ');
                    }
                    self.write_statement(child);
                }
            }
            NodeKind::Block => {
                self.buffer.push_str("{ ");
                for child in &node.children {
                    self.write_statement(child);
                    self.buffer.push(' ');
                }
                self.buffer.push('}');
            }
            NodeKind::IfStatement => {
                self.buffer.push_str("if (");
                self.write_node(&node.children[0]);
                self.buffer.push_str(") ");
                self.write_statement(&node.children[1]);
                if let Some(alt) = node.children.get(2) {
                    self.buffer.push_str(" else ");
                    self.write_statement(alt);
                }
            }
            NodeKind::WhileStatement => {
                self.buffer.push_str("while (");
                self.write_node(&node.children[0]);
                self.buffer.push_str(") ");
                self.write_statement(&node.children[1]);
            }
            NodeKind::ForeachStatement => {
                self.buffer.push_str("foreach (");
                self.write_node(&node.children[0]);
                self.buffer.push_str(" in ");
                self.write_node(&node.children[1]);
                self.buffer.push_str(") ");
                self.write_statement(&node.children[2]);
            }
            NodeKind::Assignment => {
                self.write_node(&node.children[0]);
                self.buffer.push_str(" = ");
                self.write_node(&node.children[1]);
            }

            kind if kind.is_binary_operator() => {
                self.write_operand(kind, &node.children[0], false);
                self.buffer.push(' ');
                self.buffer.push_str(kind.operator_symbol().unwrap_or("?"));
                self.buffer.push(' ');
                self.write_operand(kind, &node.children[1], true);
            }
            kind if kind.is_unary_operator() => {
                self.buffer.push_str(kind.operator_symbol().unwrap_or("?"));
                self.write_operand(kind, &node.children[0], false);
            }

            NodeKind::IntLit | NodeKind::FloatLit => self.buffer.push_str(node.image_str()),
            NodeKind::StrLit => {
                self.buffer.push('\'');
                for c in node.image_str().chars() {
                    if c == '\'' || c == '\\' {
                        self.buffer.push('\\');
                    }
                    self.buffer.push(c);
                }
                self.buffer.push('\'');
            }
            NodeKind::TrueLit => self.buffer.push_str("true"),
            NodeKind::FalseLit => self.buffer.push_str("false"),
            NodeKind::NullLit => self.buffer.push_str("null"),
            NodeKind::Identifier => self.buffer.push_str(node.image_str()),

            NodeKind::Reference => {
                for (i, element) in node.children.iter().enumerate() {
                    if i > 0 {
                        self.buffer.push('.');
                    }
                    self.write_chain_element(element);
                }
            }
            NodeKind::ArrayAccess => {
                self.write_chain_element(&node.children[0]);
                for index in &node.children[1..] {
                    self.buffer.push('[');
                    self.write_node(index);
                    self.buffer.push(']');
                }
            }
            NodeKind::Method => {
                self.buffer.push_str(node.children[0].image_str());
                self.buffer.push('(');
                for (i, argument) in node.children[1..].iter().enumerate() {
                    if i > 0 {
                        self.buffer.push_str(", ");
                    }
                    self.write_node(argument);
                }
                self.buffer.push(')');
            }
            NodeKind::SizeMethod => self.buffer.push_str("size()"),
            NodeKind::SizeFn | NodeKind::EmptyFn => {
                self.buffer
                    .push_str(if node.kind == NodeKind::SizeFn { "size(" } else { "empty(" });
                self.write_node(&node.children[0]);
                self.buffer.push(')');
            }

            NodeKind::MapLit => {
                if node.children.is_empty() {
                    self.buffer.push_str("{}");
                } else {
                    self.buffer.push_str("{ ");
                    for (i, entry) in node.children.iter().enumerate() {
                        if i > 0 {
                            self.buffer.push_str(", ");
                        }
                        self.write_node(entry);
                    }
                    self.buffer.push_str(" }");
                }
            }
            NodeKind::MapEntry => {
                self.write_node(&node.children[0]);
                self.buffer.push_str(" : ");
                self.write_node(&node.children[1]);
            }

            NodeKind::ReferenceExpression | NodeKind::ExpressionExpression | NodeKind::StatementExpression => {
                self.write_node(&node.children[0]);
            }

            // operator kinds are handled by the guard arms above
            _ => {}
        }
    }

    /// A chain element that is itself an expression (a parenthesized base)
    /// gets wrapped so the rendering re-parses as the same chain.
    fn write_chain_element(&mut self, element: &Node) {
        if precedence(element.kind).is_some() {
            self.buffer.push('(');
            self.write_node(element);
            self.buffer.push(')');
        } else {
            self.write_node(element);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn render(src: &str) -> String {
        let root = Parser::new().parse_script(src).unwrap();
        Debugger::new().render(&root)
    }

    #[test]
    fn canonical_spacing() {
        assert_eq!(render("1+2*3;"), "1 + 2 * 3;");
        assert_eq!(render("a&&b||c;"), "a && b || c;");
    }

    #[test]
    fn precedence_parens_survive() {
        assert_eq!(render("(1 + 2) * 3;"), "(1 + 2) * 3;");
        assert_eq!(render("a - (b - c);"), "a - (b - c);");
    }

    #[test]
    fn statements_and_control_flow() {
        assert_eq!(render("if (x) y = 1; else y = 2;"), "if (x) y = 1; else y = 2;");
        assert_eq!(render("foreach (v in xs) s = s + v;"), "foreach (v in xs) s = s + v;");
        assert_eq!(render("while (i < 3) i = i + 1;"), "while (i < 3) i = i + 1;");
    }

    #[test]
    fn references_and_builtins() {
        assert_eq!(render("a.b[1].c(2, 3);"), "a.b[1].c(2, 3);");
        assert_eq!(render("empty(x); size('abc');"), "empty(x); size('abc');");
        assert_eq!(render("xs.size();"), "xs.size();");
    }

    #[test]
    fn strings_reescape_single_quoted() {
        assert_eq!(render("\"it's\";"), r"'it\'s';");
    }

    #[test]
    fn pinpoint_locates_subexpression() {
        let root = Parser::new().parse_script("a + b * c;").unwrap();
        let mul = &root.children[0].children[1];
        let pin = Debugger::new().pinpoint(&root, mul.span).unwrap();
        assert_eq!(pin.snippet, "b * c");
        assert_eq!(pin.start, 4);
        assert_eq!(pin.end, 9);
    }
}
