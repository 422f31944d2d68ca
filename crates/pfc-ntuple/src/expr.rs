//! Column expressions for selections and MVA inputs
//!
//! Grammar (lowest precedence first): `||`, `&&`, comparisons, `+ -`,
//! `* / %`, unary `- !`, atoms. Atoms are numbers, column names, calls of
//! `abs sqrt log exp pow min max`, and parenthesised expressions. The
//! identifier `event` refers to the row index. Booleans are `1.0`/`0.0` and
//! any non-zero value counts as true.

use pfc_core::{Error, Result};

use crate::table::EventTable;

/// Name of the virtual row-index column.
pub const EVENT_COLUMN: &str = "event";

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl Op {
    /// Binding power; higher binds tighter.
    fn precedence(self) -> u8 {
        match self {
            Op::Or => 1,
            Op::And => 2,
            Op::Eq | Op::Ne | Op::Lt | Op::Le | Op::Gt | Op::Ge => 3,
            Op::Add | Op::Sub => 4,
            Op::Mul | Op::Div | Op::Rem => 5,
        }
    }

    fn apply(self, a: f64, b: f64) -> f64 {
        let truth = |c: bool| if c { 1.0 } else { 0.0 };
        match self {
            Op::Or => truth(a != 0.0 || b != 0.0),
            Op::And => truth(a != 0.0 && b != 0.0),
            Op::Eq => truth(a == b),
            Op::Ne => truth(a != b),
            Op::Lt => truth(a < b),
            Op::Le => truth(a <= b),
            Op::Gt => truth(a > b),
            Op::Ge => truth(a >= b),
            Op::Add => a + b,
            Op::Sub => a - b,
            Op::Mul => a * b,
            Op::Div => a / b,
            Op::Rem => a % b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Func {
    Abs,
    Sqrt,
    Log,
    Exp,
    Pow,
    Min,
    Max,
}

impl Func {
    fn lookup(name: &str) -> Option<(Func, usize)> {
        Some(match name {
            "abs" => (Func::Abs, 1),
            "sqrt" => (Func::Sqrt, 1),
            "log" => (Func::Log, 1),
            "exp" => (Func::Exp, 1),
            "pow" => (Func::Pow, 2),
            "min" => (Func::Min, 2),
            "max" => (Func::Max, 2),
            _ => return None,
        })
    }

    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Func::Abs => a.abs(),
            Func::Sqrt => a.sqrt(),
            Func::Log => a.ln(),
            Func::Exp => a.exp(),
            Func::Pow => a.powf(b),
            Func::Min => a.min(b),
            Func::Max => a.max(b),
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Const(f64),
    Column(usize),
    Event,
    Neg(Box<Node>),
    Not(Box<Node>),
    Binary(Op, Box<Node>, Box<Node>),
    Call(Func, Vec<Node>),
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(f64),
    Ident(String),
    Op(Op),
    Minus,
    Bang,
    Open,
    Close,
    Comma,
}

fn syntax(msg: String) -> Error {
    Error::Validation(format!("expression: {msg}"))
}

fn lex(src: &str) -> Result<Vec<Tok>> {
    let bytes = src.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        let next = bytes.get(i + 1).map(|&b| b as char);
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let (tok, width) = match (c, next) {
            ('&', Some('&')) => (Tok::Op(Op::And), 2),
            ('|', Some('|')) => (Tok::Op(Op::Or), 2),
            ('=', Some('=')) => (Tok::Op(Op::Eq), 2),
            ('!', Some('=')) => (Tok::Op(Op::Ne), 2),
            ('<', Some('=')) => (Tok::Op(Op::Le), 2),
            ('>', Some('=')) => (Tok::Op(Op::Ge), 2),
            ('<', _) => (Tok::Op(Op::Lt), 1),
            ('>', _) => (Tok::Op(Op::Gt), 1),
            ('!', _) => (Tok::Bang, 1),
            ('+', _) => (Tok::Op(Op::Add), 1),
            ('-', _) => (Tok::Minus, 1),
            ('*', _) => (Tok::Op(Op::Mul), 1),
            ('/', _) => (Tok::Op(Op::Div), 1),
            ('%', _) => (Tok::Op(Op::Rem), 1),
            ('(', _) => (Tok::Open, 1),
            (')', _) => (Tok::Close, 1),
            (',', _) => (Tok::Comma, 1),
            (d, _) if d.is_ascii_digit() || d == '.' => {
                let start = i;
                let mut j = i;
                while j < bytes.len() {
                    let ch = bytes[j] as char;
                    let exp_sign = (ch == '+' || ch == '-')
                        && j > start
                        && matches!(bytes[j - 1] as char, 'e' | 'E');
                    if ch.is_ascii_digit() || ch == '.' || ch == 'e' || ch == 'E' || exp_sign {
                        j += 1;
                    } else {
                        break;
                    }
                }
                let text = &src[start..j];
                let v = text.parse::<f64>().map_err(|_| syntax(format!("bad number '{text}'")))?;
                (Tok::Num(v), j - start)
            }
            (a, _) if a.is_ascii_alphabetic() || a == '_' => {
                let len = bytes[i..]
                    .iter()
                    .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
                    .count();
                (Tok::Ident(src[i..i + len].to_string()), len)
            }
            (other, _) => return Err(syntax(format!("unexpected character '{other}'"))),
        };
        out.push(tok);
        i += width;
    }
    Ok(out)
}

struct Parser {
    toks: Vec<Tok>,
    pos: usize,
    columns: Vec<String>,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn bump(&mut self) -> Option<Tok> {
        let t = self.toks.get(self.pos).cloned();
        self.pos += usize::from(t.is_some());
        t
    }

    fn binary_op(&self) -> Option<Op> {
        match self.peek()? {
            Tok::Op(op) => Some(*op),
            Tok::Minus => Some(Op::Sub),
            _ => None,
        }
    }

    /// Precedence climbing: parse operators binding at least `min_prec`.
    fn expr(&mut self, min_prec: u8) -> Result<Node> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.binary_op() {
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.pos += 1;
            let rhs = self.expr(prec + 1)?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
            // comparisons do not chain
            if prec == 3 && matches!(self.binary_op(), Some(o) if o.precedence() == 3) {
                return Err(syntax("chained comparison".to_string()));
            }
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Node> {
        match self.peek() {
            Some(Tok::Minus) => {
                self.pos += 1;
                Ok(Node::Neg(Box::new(self.unary()?)))
            }
            Some(Tok::Bang) => {
                self.pos += 1;
                Ok(Node::Not(Box::new(self.unary()?)))
            }
            _ => self.atom(),
        }
    }

    fn atom(&mut self) -> Result<Node> {
        match self.bump() {
            Some(Tok::Num(v)) => Ok(Node::Const(v)),
            Some(Tok::Open) => {
                let inner = self.expr(1)?;
                match self.bump() {
                    Some(Tok::Close) => Ok(inner),
                    other => Err(syntax(format!("expected ')', found {other:?}"))),
                }
            }
            Some(Tok::Ident(name)) if self.peek() == Some(&Tok::Open) => {
                self.pos += 1;
                let (func, arity) =
                    Func::lookup(&name).ok_or_else(|| syntax(format!("unknown function '{name}'")))?;
                let mut args = vec![self.expr(1)?];
                while self.peek() == Some(&Tok::Comma) {
                    self.pos += 1;
                    args.push(self.expr(1)?);
                }
                match self.bump() {
                    Some(Tok::Close) => {}
                    other => return Err(syntax(format!("expected ')', found {other:?}"))),
                }
                if args.len() != arity {
                    return Err(syntax(format!(
                        "{name}() takes {arity} argument(s), got {}",
                        args.len()
                    )));
                }
                Ok(Node::Call(func, args))
            }
            Some(Tok::Ident(name)) if name == EVENT_COLUMN => Ok(Node::Event),
            Some(Tok::Ident(name)) => {
                let idx = match self.columns.iter().position(|c| *c == name) {
                    Some(i) => i,
                    None => {
                        self.columns.push(name);
                        self.columns.len() - 1
                    }
                };
                Ok(Node::Column(idx))
            }
            other => Err(syntax(format!("expected a value, found {other:?}"))),
        }
    }
}

/// Parsed expression with the list of columns it reads.
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    source: String,
    root: Node,
    columns: Vec<String>,
}

impl CompiledExpr {
    pub fn compile(source: &str) -> Result<Self> {
        let toks = lex(source)?;
        if toks.is_empty() {
            return Err(syntax("empty expression".to_string()));
        }
        let mut parser = Parser { toks, pos: 0, columns: Vec::new() };
        let root = parser.expr(1)?;
        if let Some(t) = parser.peek() {
            return Err(syntax(format!("unexpected {t:?} in '{source}'")));
        }
        Ok(Self { source: source.to_string(), root, columns: parser.columns })
    }

    /// Conjunction of several selection clauses; empty means "all rows".
    pub fn all_of(clauses: &[String]) -> Result<Self> {
        if clauses.is_empty() {
            return Self::compile("1");
        }
        let joined = clauses.iter().map(|c| format!("({c})")).collect::<Vec<_>>().join(" && ");
        Self::compile(&joined)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Columns referenced, in order of first appearance (`event` excluded).
    pub fn required_columns(&self) -> &[String] {
        &self.columns
    }

    /// Evaluate for one row given the values of [`Self::required_columns`].
    pub fn eval_row(&self, row: usize, values: &[f64]) -> f64 {
        eval_scalar(&self.root, row, values)
    }

    /// Evaluate over every row of `table`.
    pub fn eval_table(&self, table: &EventTable) -> Result<Vec<f64>> {
        let cols: Vec<&[f64]> =
            self.columns.iter().map(|c| table.column(c)).collect::<Result<_>>()?;
        Ok(eval_columns(&self.root, &cols, table.len()))
    }

    /// Rows where the expression is non-zero.
    pub fn mask(&self, table: &EventTable) -> Result<Vec<bool>> {
        Ok(self.eval_table(table)?.into_iter().map(|v| v != 0.0).collect())
    }
}

fn eval_scalar(node: &Node, row: usize, values: &[f64]) -> f64 {
    match node {
        Node::Const(v) => *v,
        Node::Column(i) => values[*i],
        Node::Event => row as f64,
        Node::Neg(a) => -eval_scalar(a, row, values),
        Node::Not(a) => f64::from(u8::from(eval_scalar(a, row, values) == 0.0)),
        Node::Binary(op, a, b) => op.apply(eval_scalar(a, row, values), eval_scalar(b, row, values)),
        Node::Call(f, args) => {
            let a = eval_scalar(&args[0], row, values);
            let b = args.get(1).map_or(0.0, |n| eval_scalar(n, row, values));
            f.apply(a, b)
        }
    }
}

/// Whole-column evaluation, one pass per node.
fn eval_columns(node: &Node, cols: &[&[f64]], n: usize) -> Vec<f64> {
    match node {
        Node::Const(v) => vec![*v; n],
        Node::Column(i) => cols[*i].to_vec(),
        Node::Event => (0..n).map(|r| r as f64).collect(),
        Node::Neg(a) => eval_columns(a, cols, n).into_iter().map(|v| -v).collect(),
        Node::Not(a) => {
            eval_columns(a, cols, n).into_iter().map(|v| if v == 0.0 { 1.0 } else { 0.0 }).collect()
        }
        Node::Binary(op, a, b) => {
            let mut lhs = eval_columns(a, cols, n);
            let rhs = eval_columns(b, cols, n);
            for (l, r) in lhs.iter_mut().zip(rhs) {
                *l = op.apply(*l, r);
            }
            lhs
        }
        Node::Call(f, args) => {
            let mut first = eval_columns(&args[0], cols, n);
            match args.get(1) {
                Some(second) => {
                    for (a, b) in first.iter_mut().zip(eval_columns(second, cols, n)) {
                        *a = f.apply(*a, b);
                    }
                }
                None => first.iter_mut().for_each(|a| *a = f.apply(*a, 0.0)),
            }
            first
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn eval(src: &str, values: &[f64]) -> f64 {
        CompiledExpr::compile(src).unwrap().eval_row(0, values)
    }

    #[test]
    fn precedence() {
        assert_relative_eq!(eval("2 + 3 * 4", &[]), 14.0);
        assert_relative_eq!(eval("(2 + 3) * 4", &[]), 20.0);
        assert_relative_eq!(eval("10 - 4 - 3", &[]), 3.0);
        assert_relative_eq!(eval("-2 * -3", &[]), 6.0);
        assert_relative_eq!(eval("7 % 4 + 1", &[]), 4.0);
        assert_relative_eq!(eval("1.5e2 + 3.0E-1", &[]), 150.3);
    }

    #[test]
    fn selections() {
        let e = CompiledExpr::compile("abs(pfEta) < 1.479 && pfE/mcE > 0.4").unwrap();
        assert_eq!(e.required_columns(), ["pfEta", "pfE", "mcE"]);
        assert_eq!(e.eval_row(0, &[-1.2, 5.0, 10.0]), 1.0);
        assert_eq!(e.eval_row(0, &[1.6, 5.0, 10.0]), 0.0);
        assert_eq!(e.eval_row(0, &[0.0, 1.0, 10.0]), 0.0);
        assert_eq!(eval("!(x > 3) || x == 7", &[7.0]), 1.0);
        assert_eq!(eval("x != 7", &[7.0]), 0.0);
    }

    #[test]
    fn functions() {
        assert_relative_eq!(eval("sqrt(x)", &[9.0]), 3.0);
        assert_relative_eq!(eval("pow(x, 2)", &[3.0]), 9.0);
        assert_relative_eq!(eval("max(a, b) - min(a, b)", &[3.0, 7.0]), 4.0);
        assert_relative_eq!(eval("log(exp(x))", &[0.25]), 0.25);
    }

    #[test]
    fn event_index_and_table() {
        let t = EventTable::from_columns([
            ("pfE", vec![1.0, 2.0, 3.0, 4.0]),
            ("mcE", vec![2.0, 2.0, 2.0, 2.0]),
        ])
        .unwrap();
        let even = CompiledExpr::compile("event % 2 == 0").unwrap();
        assert!(even.required_columns().is_empty());
        assert_eq!(even.mask(&t).unwrap(), vec![true, false, true, false]);

        let ratio = CompiledExpr::compile("pfE/mcE").unwrap();
        assert_eq!(ratio.eval_table(&t).unwrap(), vec![0.5, 1.0, 1.5, 2.0]);

        let missing = CompiledExpr::compile("ps1E/pfE").unwrap();
        assert!(matches!(missing.eval_table(&t), Err(Error::MissingColumn(_))));
    }

    #[test]
    fn conjunction() {
        let e = CompiledExpr::all_of(&["x > 1".to_string(), "x < 3".to_string()]).unwrap();
        assert_eq!(e.eval_row(0, &[2.0]), 1.0);
        assert_eq!(e.eval_row(0, &[3.0]), 0.0);
        assert_eq!(CompiledExpr::all_of(&[]).unwrap().eval_row(0, &[]), 1.0);
    }

    #[test]
    fn syntax_errors() {
        for bad in ["", "1 +", "foo(1)", "pow(1)", "(1", "1 < 2 < 3", "a $ b", "1 2"] {
            assert!(CompiledExpr::compile(bad).is_err(), "{bad}");
        }
    }
}
