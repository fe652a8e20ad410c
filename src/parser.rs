use crate::diagnostic::Diagnostic;
use crate::ir::{BinOp, Comprehension, Expr, Generator, ReduceOp, ResultKind, Source, UnOp};
use crate::lexeme::Lexeme;
use crate::span::{Span, Spanned};

type ParseResult<T> = Result<T, Diagnostic>;

/// Recursive-descent parser for the comprehension subset.
///
/// Normalizations applied while building the IR (downstream code relies on
/// them): chained comparisons (`a <= x <= b`) become conjunctions of simple
/// comparisons, top-level `and` chains in filters are split into separate
/// predicates, and every variable reference is checked against the bound
/// variables in scope.
pub struct Parser {
    tokens: Vec<Spanned<Lexeme>>,
    pos: usize,
    /// Bound variables of the generators parsed so far. Filters are parsed
    /// with this scope active; the element/key expressions are parsed first
    /// and validated once all generators are known.
    scope: Vec<String>,
    in_filter: bool,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned<Lexeme>>) -> Self {
        Self {
            tokens,
            pos: 0,
            scope: Vec::new(),
            in_filter: false,
        }
    }

    pub fn parse_comprehension(mut self) -> Result<Comprehension, Vec<Diagnostic>> {
        let comp = self.parse_root().map_err(|d| vec![d])?;
        if let Err(d) = self.expect(&Lexeme::Eof) {
            return Err(vec![d]);
        }
        Ok(comp)
    }

    fn parse_root(&mut self) -> ParseResult<Comprehension> {
        match self.peek().clone() {
            Lexeme::LBracket => self.parse_list(),
            Lexeme::LBrace => self.parse_set_or_dict(),
            Lexeme::Ident(name) => self.parse_reduction(&name),
            other => Err(Diagnostic::error(
                format!("expected a comprehension, found {}", other.description()),
                self.current_span(),
            )
            .with_help(
                "supported forms: [e for v in src], {e for v in src}, \
                 {k: v for x in src}, and sum/count/max/min/any/all(e for v in src)",
            )),
        }
    }

    fn parse_list(&mut self) -> ParseResult<Comprehension> {
        self.expect(&Lexeme::LBracket)?;
        let (element, element_span) = self.parse_spanned_expr()?;
        let generators = self.parse_generators()?;
        self.expect(&Lexeme::RBracket)?;
        self.check_scoped(&element, element_span)?;
        Ok(Comprehension {
            kind: ResultKind::List,
            element,
            key: None,
            generators,
        })
    }

    fn parse_set_or_dict(&mut self) -> ParseResult<Comprehension> {
        self.expect(&Lexeme::LBrace)?;
        let (first, first_span) = self.parse_spanned_expr()?;

        if self.eat(&Lexeme::Colon) {
            // Dict: {key: value for ...}
            let (value, value_span) = self.parse_spanned_expr()?;
            let generators = self.parse_generators()?;
            self.expect(&Lexeme::RBrace)?;
            self.check_scoped(&first, first_span)?;
            self.check_scoped(&value, value_span)?;
            Ok(Comprehension {
                kind: ResultKind::Dict,
                element: value,
                key: Some(first),
                generators,
            })
        } else {
            let generators = self.parse_generators()?;
            self.expect(&Lexeme::RBrace)?;
            self.check_scoped(&first, first_span)?;
            Ok(Comprehension {
                kind: ResultKind::Set,
                element: first,
                key: None,
                generators,
            })
        }
    }

    fn parse_reduction(&mut self, name: &str) -> ParseResult<Comprehension> {
        let span = self.current_span();
        let Some(op) = ReduceOp::from_name(name) else {
            return Err(Diagnostic::error(
                format!("unsupported function '{}'", name),
                span,
            )
            .with_help("supported reductions: sum, count, max, min, any, all"));
        };
        self.advance(); // reduction name
        self.expect(&Lexeme::LParen)?;
        let (element, element_span) = self.parse_spanned_expr()?;
        let generators = self.parse_generators()?;
        self.expect(&Lexeme::RParen)?;
        self.check_scoped(&element, element_span)?;
        Ok(Comprehension {
            kind: ResultKind::Reduce(op),
            element,
            key: None,
            generators,
        })
    }

    // --- Generators ---

    fn parse_generators(&mut self) -> ParseResult<Vec<Generator>> {
        let mut generators = Vec::new();
        while self.at(&Lexeme::For) {
            self.advance();
            let var = self.expect_ident()?;
            self.expect(&Lexeme::In)?;
            let source = self.parse_source()?;
            self.scope.push(var.clone());

            let mut filters = Vec::new();
            while self.at(&Lexeme::If) {
                self.advance();
                self.in_filter = true;
                let predicate = self.parse_expr();
                self.in_filter = false;
                // Flatten `p and q` into separate predicates
                filters.extend(predicate?.into_conjunction());
            }

            generators.push(Generator {
                var,
                source,
                filters,
            });
        }

        if generators.is_empty() {
            return Err(Diagnostic::error(
                format!("expected 'for', found {}", self.peek().description()),
                self.current_span(),
            ));
        }
        Ok(generators)
    }

    fn parse_source(&mut self) -> ParseResult<Source> {
        let span = self.current_span();
        let name = self.expect_ident()?;

        if name == "range" {
            self.expect(&Lexeme::LParen)?;
            let mut args = vec![self.parse_range_arg()?];
            while self.eat(&Lexeme::Comma) {
                args.push(self.parse_range_arg()?);
            }
            let close = self.expect(&Lexeme::RParen)?;
            let full = span.merge(close);

            let (start, stop, step) = match args.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => {
                    return Err(Diagnostic::error(
                        format!("range() takes 1 to 3 arguments, got {}", args.len()),
                        full,
                    ))
                }
            };
            if step <= 0 {
                return Err(Diagnostic::error(
                    format!("range() step must be positive, got {}", step),
                    full,
                )
                .with_help("descending and zero-step ranges are not supported"));
            }
            return Ok(Source::Range { start, stop, step });
        }

        if self.at(&Lexeme::LParen) {
            return Err(Diagnostic::error(
                format!("unsupported callable source '{}'", name),
                span,
            )
            .with_help("a source is either range(...) or a named collection"));
        }
        Ok(Source::Named(name))
    }

    /// Range bounds must be (possibly negated) integer literals so that the
    /// range's cardinality is known at generation time.
    fn parse_range_arg(&mut self) -> ParseResult<i64> {
        let negative = self.eat(&Lexeme::Minus);
        let span = self.current_span();
        match self.peek().clone() {
            Lexeme::Integer(value) => {
                self.advance();
                Ok(if negative { -value } else { value })
            }
            other => Err(Diagnostic::error(
                format!(
                    "range() arguments must be integer literals, found {}",
                    other.description()
                ),
                span,
            )),
        }
    }

    // --- Expressions ---

    fn parse_spanned_expr(&mut self) -> ParseResult<(Expr, Span)> {
        let start = self.current_span();
        let expr = self.parse_expr()?;
        Ok((expr, start.merge(self.prev_span())))
    }

    fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Lexeme::Or) {
            let rhs = self.parse_and()?;
            lhs = Expr::binary(BinOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_not()?;
        while self.eat(&Lexeme::And) {
            let rhs = self.parse_not()?;
            lhs = Expr::binary(BinOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> ParseResult<Expr> {
        if self.eat(&Lexeme::Not) {
            let expr = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnOp::Not,
                expr: Box::new(expr),
            });
        }
        self.parse_comparison()
    }

    /// Comparisons may chain: `a <= x < b` normalizes to
    /// `a <= x and x < b` (the shared operand is duplicated).
    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let first = self.parse_arith()?;

        let mut operands = vec![first];
        let mut ops = Vec::new();
        while let Some(op) = self.peek_comparison() {
            self.advance();
            ops.push(op);
            operands.push(self.parse_arith()?);
        }

        match ops.len() {
            0 => Ok(operands.pop().expect("one operand parsed")),
            _ => {
                let mut links = ops.iter().enumerate().map(|(i, op)| {
                    Expr::binary(*op, operands[i].clone(), operands[i + 1].clone())
                });
                let head = links.next().expect("at least one comparison");
                Ok(links.fold(head, |acc, link| Expr::binary(BinOp::And, acc, link)))
            }
        }
    }

    fn peek_comparison(&self) -> Option<BinOp> {
        match self.peek() {
            Lexeme::EqEq => Some(BinOp::Eq),
            Lexeme::NotEq => Some(BinOp::Ne),
            Lexeme::Lt => Some(BinOp::Lt),
            Lexeme::LtEq => Some(BinOp::Le),
            Lexeme::Gt => Some(BinOp::Gt),
            Lexeme::GtEq => Some(BinOp::Ge),
            _ => None,
        }
    }

    fn parse_arith(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Lexeme::Plus => BinOp::Add,
                Lexeme::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_term()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Lexeme::Star => BinOp::Mul,
                Lexeme::Slash => BinOp::Div,
                Lexeme::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        if self.eat(&Lexeme::Minus) {
            let expr = self.parse_unary()?;
            // Fold negation into integer literals immediately
            if let Expr::Int(value) = expr {
                return Ok(Expr::Int(-value));
            }
            return Ok(Expr::Unary {
                op: UnOp::Neg,
                expr: Box::new(expr),
            });
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> ParseResult<Expr> {
        let base = self.parse_primary()?;
        if self.eat(&Lexeme::StarStar) {
            // Right-associative; the exponent may carry a unary minus
            let exponent = self.parse_unary()?;
            return Ok(Expr::binary(BinOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        match self.peek().clone() {
            Lexeme::Integer(value) => {
                self.advance();
                Ok(Expr::Int(value))
            }
            Lexeme::True => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            Lexeme::False => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            Lexeme::Ident(name) => {
                self.advance();
                if self.at(&Lexeme::LParen) {
                    return Err(Diagnostic::error(
                        format!("unsupported function call '{}'", name),
                        span,
                    )
                    .with_help(
                        "calls are only supported as the outer reduction \
                         (sum, count, max, min, any, all)",
                    ));
                }
                if self.in_filter && !self.scope.iter().any(|v| v == &name) {
                    return Err(Diagnostic::error(
                        format!("unknown variable '{}'", name),
                        span,
                    )
                    .with_help("filters may only reference bound loop variables"));
                }
                Ok(Expr::Var(name))
            }
            Lexeme::LParen => {
                self.advance();
                let first = self.parse_expr()?;
                if self.eat(&Lexeme::Comma) {
                    let mut elements = vec![first];
                    while !self.at(&Lexeme::RParen) {
                        elements.push(self.parse_expr()?);
                        if !self.eat(&Lexeme::Comma) {
                            break;
                        }
                    }
                    self.expect(&Lexeme::RParen)?;
                    return Ok(Expr::Tuple(elements));
                }
                self.expect(&Lexeme::RParen)?;
                Ok(first)
            }
            other => Err(Diagnostic::error(
                format!("expected an expression, found {}", other.description()),
                span,
            )),
        }
    }

    /// Validate an element/key expression (parsed before the generators)
    /// against the full set of bound variables.
    fn check_scoped(&self, expr: &Expr, span: Span) -> ParseResult<()> {
        let mut unknown = None;
        walk_vars(expr, &mut |name| {
            if unknown.is_none() && !self.scope.iter().any(|v| v == name) {
                unknown = Some(name.to_string());
            }
        });
        match unknown {
            Some(name) => Err(Diagnostic::error(
                format!("unknown variable '{}'", name),
                span,
            )
            .with_help("expressions may only reference bound loop variables")),
            None => Ok(()),
        }
    }

    // --- Token helpers ---

    fn peek(&self) -> &Lexeme {
        &self.tokens[self.pos].node
    }

    fn current_span(&self) -> Span {
        self.tokens[self.pos].span
    }

    fn prev_span(&self) -> Span {
        self.tokens[self.pos.saturating_sub(1)].span
    }

    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn at(&self, lexeme: &Lexeme) -> bool {
        self.peek() == lexeme
    }

    fn eat(&mut self, lexeme: &Lexeme) -> bool {
        if self.at(lexeme) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, lexeme: &Lexeme) -> ParseResult<Span> {
        if self.at(lexeme) {
            let span = self.current_span();
            self.advance();
            return Ok(span);
        }
        Err(Diagnostic::error(
            format!(
                "expected {}, found {}",
                lexeme.description(),
                self.peek().description()
            ),
            self.current_span(),
        ))
    }

    fn expect_ident(&mut self) -> ParseResult<String> {
        match self.peek().clone() {
            Lexeme::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(Diagnostic::error(
                format!("expected identifier, found {}", other.description()),
                self.current_span(),
            )),
        }
    }
}

fn walk_vars(expr: &Expr, visit: &mut impl FnMut(&str)) {
    match expr {
        Expr::Var(name) => visit(name),
        Expr::Int(_) | Expr::Bool(_) => {}
        Expr::Tuple(items) => {
            for item in items {
                walk_vars(item, visit);
            }
        }
        Expr::Unary { expr, .. } => walk_vars(expr, visit),
        Expr::Binary { lhs, rhs, .. } => {
            walk_vars(lhs, visit);
            walk_vars(rhs, visit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(source: &str) -> Comprehension {
        let (tokens, errors) = Lexer::new(source).tokenize();
        assert!(errors.is_empty(), "lex errors: {:?}", errors);
        Parser::new(tokens)
            .parse_comprehension()
            .unwrap_or_else(|e| panic!("parse errors for '{}': {:?}", source, e))
    }

    fn parse_err(source: &str) -> Diagnostic {
        let (tokens, errors) = Lexer::new(source).tokenize();
        assert!(errors.is_empty(), "lex errors: {:?}", errors);
        match Parser::new(tokens).parse_comprehension() {
            Ok(_) => panic!("expected parse failure for '{}'", source),
            Err(mut diags) => diags.remove(0),
        }
    }

    #[test]
    fn list_comprehension_with_filter() {
        let comp = parse("[x*x for x in range(10) if x % 2 == 0]");
        assert_eq!(comp.kind, ResultKind::List);
        assert_eq!(comp.generators.len(), 1);
        let gen = &comp.generators[0];
        assert_eq!(gen.var, "x");
        assert_eq!(
            gen.source,
            Source::Range {
                start: 0,
                stop: 10,
                step: 1
            }
        );
        assert_eq!(gen.filters.len(), 1);
    }

    #[test]
    fn range_argument_forms() {
        let one = parse("[i for i in range(5)]");
        assert_eq!(
            one.generators[0].source,
            Source::Range {
                start: 0,
                stop: 5,
                step: 1
            }
        );

        let two = parse("[i for i in range(1, 6)]");
        assert_eq!(
            two.generators[0].source,
            Source::Range {
                start: 1,
                stop: 6,
                step: 1
            }
        );

        let three = parse("[i for i in range(0, 10, 2)]");
        assert_eq!(
            three.generators[0].source,
            Source::Range {
                start: 0,
                stop: 10,
                step: 2
            }
        );

        let negative_start = parse("[i for i in range(-5, 5)]");
        assert_eq!(
            negative_start.generators[0].source,
            Source::Range {
                start: -5,
                stop: 5,
                step: 1
            }
        );
    }

    #[test]
    fn named_source() {
        let comp = parse("[x + 1 for x in data]");
        assert_eq!(comp.generators[0].source, Source::Named("data".into()));
    }

    #[test]
    fn set_comprehension() {
        let comp = parse("{x % 3 for x in range(10)}");
        assert_eq!(comp.kind, ResultKind::Set);
        assert!(comp.key.is_none());
    }

    #[test]
    fn dict_comprehension() {
        let comp = parse("{i: i*i for i in range(1, 6)}");
        assert_eq!(comp.kind, ResultKind::Dict);
        assert_eq!(comp.key, Some(Expr::var("i")));
        assert_eq!(
            comp.element,
            Expr::binary(BinOp::Mul, Expr::var("i"), Expr::var("i"))
        );
    }

    #[test]
    fn reductions() {
        for (source, op) in [
            ("sum(i*i for i in range(10))", ReduceOp::Sum),
            ("count(i for i in range(10))", ReduceOp::Count),
            ("max(i for i in range(10))", ReduceOp::Max),
            ("min(i for i in range(10))", ReduceOp::Min),
            ("any(i > 5 for i in range(10))", ReduceOp::Any),
            ("all(i > 5 for i in range(10))", ReduceOp::All),
        ] {
            let comp = parse(source);
            assert_eq!(comp.kind, ResultKind::Reduce(op), "for {}", source);
        }
    }

    #[test]
    fn nested_generators_ordered_outer_to_inner() {
        let comp = parse("[(i, j) for i in range(3) for j in range(4) if i != j]");
        assert_eq!(comp.generators.len(), 2);
        assert_eq!(comp.generators[0].var, "i");
        assert_eq!(comp.generators[1].var, "j");
        // The filter attaches to the inner generator
        assert!(comp.generators[0].filters.is_empty());
        assert_eq!(comp.generators[1].filters.len(), 1);
        assert_eq!(comp.element, Expr::Tuple(vec![Expr::var("i"), Expr::var("j")]));
    }

    #[test]
    fn chained_comparison_normalizes_to_conjuncts() {
        let comp = parse("[x for x in range(100) if 10 <= x < 20]");
        let filters = &comp.generators[0].filters;
        assert_eq!(filters.len(), 2, "chained comparison splits into two predicates");
        assert_eq!(
            filters[0],
            Expr::binary(BinOp::Le, Expr::Int(10), Expr::var("x"))
        );
        assert_eq!(
            filters[1],
            Expr::binary(BinOp::Lt, Expr::var("x"), Expr::Int(20))
        );
    }

    #[test]
    fn and_filter_splits_into_predicates() {
        let comp = parse("[x for x in range(100) if x % 2 == 0 and x % 3 == 0]");
        assert_eq!(comp.generators[0].filters.len(), 2);
    }

    #[test]
    fn or_filter_stays_single_predicate() {
        let comp = parse("[x for x in range(100) if x % 2 == 0 or x % 3 == 0]");
        assert_eq!(comp.generators[0].filters.len(), 1);
    }

    #[test]
    fn multiple_if_clauses() {
        let comp = parse("[x for x in range(100) if x % 2 == 0 if x % 3 == 0]");
        assert_eq!(comp.generators[0].filters.len(), 2);
    }

    #[test]
    fn power_is_right_associative() {
        let comp = parse("[x ** 2 ** 3 for x in range(4)]");
        // x ** (2 ** 3)
        assert_eq!(
            comp.element,
            Expr::binary(
                BinOp::Pow,
                Expr::var("x"),
                Expr::binary(BinOp::Pow, Expr::Int(2), Expr::Int(3)),
            )
        );
    }

    #[test]
    fn unary_minus_folds_into_literals() {
        let comp = parse("[-1 * x for x in range(4)]");
        assert_eq!(
            comp.element,
            Expr::binary(BinOp::Mul, Expr::Int(-1), Expr::var("x"))
        );
    }

    #[test]
    fn unknown_function_is_rejected() {
        let diag = parse_err("map(x for x in range(3))");
        assert!(diag.message.contains("unsupported function 'map'"));
        assert!(diag.help.is_some());
    }

    #[test]
    fn non_literal_range_bound_is_rejected() {
        let diag = parse_err("[x for x in range(n)]");
        assert!(diag.message.contains("integer literals"));
    }

    #[test]
    fn negative_step_is_rejected() {
        let diag = parse_err("[x for x in range(10, 0, -1)]");
        assert!(diag.message.contains("step must be positive"));
    }

    #[test]
    fn unknown_variable_in_element_is_rejected() {
        let diag = parse_err("[y for x in range(3)]");
        assert!(diag.message.contains("unknown variable 'y'"));
    }

    #[test]
    fn unknown_variable_in_filter_is_rejected() {
        let diag = parse_err("[x for x in range(3) if y > 0]");
        assert!(diag.message.contains("unknown variable 'y'"));
    }

    #[test]
    fn inner_filter_may_reference_outer_variable() {
        let comp = parse("[i*j for i in range(3) for j in range(3) if i*j > 1]");
        assert_eq!(comp.generators[1].filters.len(), 1);
    }

    #[test]
    fn trailing_tokens_are_rejected(){
        let diag = parse_err("[x for x in range(3)] extra");
        assert!(diag.message.contains("expected end of input"));
    }

    #[test]
    fn bare_generator_expression_is_rejected() {
        let diag = parse_err("(x for x in range(3))");
        assert!(diag.message.contains("expected a comprehension"));
    }
}
