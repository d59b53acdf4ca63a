use crate::errors::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::iter::Peekable;
use std::str::Chars;

/// Maps a class to its single base class.
pub type ClassInheritanceMap = BTreeMap<String, String>;

/// Every configuration is implicitly a member of this class.
pub const ALL_CLASS: &str = "all";
pub const DEFAULT_CLASS: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Subtract,
    #[serde(rename = "&")]
    Intersect,
}

impl Operation {
    fn from_char(c: char) -> Option<Operation> {
        match c {
            '+' => Some(Operation::Add),
            '-' => Some(Operation::Subtract),
            '&' => Some(Operation::Intersect),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Class(String),
    Nested(Vec<ClassTerm>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassTerm {
    pub operation: Operation,
    #[serde(default)]
    pub inverted: bool,
    pub operand: Operand,
}

/// A build class expression, as declared by a package:
///
/// ```text
/// [<underlying-class>... :] (+|-|&)[!](<class>|(<terms>))...
/// ```
///
/// The comment doubles as the human readable exclusion reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassExpr {
    #[serde(default)]
    pub underlying_classes: Vec<String>,
    #[serde(default)]
    pub terms: Vec<ClassTerm>,
    #[serde(default)]
    pub comment: String,
}

impl ClassExpr {
    pub fn parse(expr: &str, comment: &str) -> Result<ClassExpr> {
        let mut parser = Parser {
            input: expr,
            chars: expr.chars().peekable(),
        };

        let underlying_classes = parser.underlying_classes()?;
        let terms = parser.terms(false)?;

        Ok(ClassExpr {
            underlying_classes,
            terms,
            comment: comment.to_string(),
        })
    }

    /// Builds `+c1 +c2 ...` for `Add` and `&(+c1 +c2 ...)` for `Intersect`,
    /// i.e. adds or intersects with the union of the classes.
    pub fn synthetic(operation: Operation, classes: &[String]) -> ClassExpr {
        let union = classes
            .iter()
            .map(|class| ClassTerm {
                operation: Operation::Add,
                inverted: false,
                operand: Operand::Class(class.clone()),
            })
            .collect::<Vec<_>>();

        let terms = match operation {
            Operation::Add => union,
            _ => vec![ClassTerm {
                operation,
                inverted: false,
                operand: Operand::Nested(union),
            }],
        };

        ClassExpr {
            underlying_classes: Vec::new(),
            terms,
            comment: String::new(),
        }
    }

    /// Folds this expression into `result` for a configuration with the
    /// given classes.
    pub fn apply(&self, classes: &[String], inheritance: &ClassInheritanceMap, result: &mut bool) {
        match_terms(&self.terms, classes, inheritance, result);
    }

    pub fn starts_with_addition(&self) -> bool {
        self.terms
            .first()
            .map(|t| t.operation == Operation::Add)
            .unwrap_or(true)
    }
}

fn match_terms(
    terms: &[ClassTerm],
    classes: &[String],
    inheritance: &ClassInheritanceMap,
    result: &mut bool,
) {
    for term in terms {
        // '+' can only turn false into true, '-' and '&' only true into false
        if (term.operation == Operation::Add) == *result {
            continue;
        }

        let mut m = match &term.operand {
            Operand::Class(name) => {
                name == ALL_CLASS
                    || classes
                        .iter()
                        .any(|class| is_derived_from(class, name, inheritance))
            }
            Operand::Nested(terms) => {
                let mut m = false;
                match_terms(terms, classes, inheritance, &mut m);
                m
            }
        };

        if term.inverted {
            m = !m;
        }

        match term.operation {
            Operation::Add => {
                if m {
                    *result = true;
                }
            }
            Operation::Subtract => {
                if m {
                    *result = false;
                }
            }
            Operation::Intersect => *result &= m,
        }
    }
}

/// Walks the inheritance chain of `class` looking for `name`.
fn is_derived_from(class: &str, name: &str, inheritance: &ClassInheritanceMap) -> bool {
    let mut current = class;
    // bounded by the map size, a cycle can't keep us here forever
    for _ in 0..=inheritance.len() {
        if current == name {
            return true;
        }
        match inheritance.get(current) {
            Some(base) => current = base,
            None => return false,
        }
    }
    false
}

fn is_class_char(c: char, first: bool) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || (!first && matches!(c, '.' | '-' | '+'))
}

struct Parser<'a> {
    input: &'a str,
    chars: Peekable<Chars<'a>>,
}

impl Parser<'_> {
    fn skip_whitespace(&mut self) {
        while self.chars.next_if(|c| c.is_whitespace()).is_some() {}
    }

    fn class_name(&mut self) -> Result<String> {
        let mut name = String::new();
        loop {
            let first = name.is_empty();
            match self.chars.next_if(|c| is_class_char(*c, first)) {
                Some(c) => name.push(c),
                None => break,
            }
        }
        if name.is_empty() {
            bail!("Expected class name in build class expression: {:?}", self.input);
        }
        Ok(name)
    }

    fn underlying_classes(&mut self) -> Result<Vec<String>> {
        let mut classes = Vec::new();

        self.skip_whitespace();
        match self.chars.peek() {
            None => return Ok(classes),
            Some(c) if Operation::from_char(*c).is_some() => return Ok(classes),
            _ => (),
        }

        loop {
            self.skip_whitespace();
            match self.chars.peek() {
                None => break,
                Some(':') => {
                    self.chars.next();
                    break;
                }
                Some(c) if Operation::from_char(*c).is_some() => {
                    bail!(
                        "Expected ':' after underlying classes in build class expression: {:?}",
                        self.input
                    );
                }
                _ => classes.push(self.class_name()?),
            }
        }

        if classes.is_empty() {
            bail!(
                "Expected underlying class before ':' in build class expression: {:?}",
                self.input
            );
        }

        Ok(classes)
    }

    fn terms(&mut self, nested: bool) -> Result<Vec<ClassTerm>> {
        let mut terms = Vec::new();

        loop {
            self.skip_whitespace();
            let c = match self.chars.peek() {
                None if nested => bail!("Unterminated '(' in build class expression: {:?}", self.input),
                None => break,
                Some(')') if nested => {
                    self.chars.next();
                    break;
                }
                Some(c) => *c,
            };

            let operation = Operation::from_char(c).ok_or_else(|| {
                format_err!(
                    "Expected '+', '-' or '&' instead of {:?} in build class expression: {:?}",
                    c,
                    self.input
                )
            })?;
            self.chars.next();

            let inverted = self.chars.next_if_eq(&'!').is_some();

            let operand = if self.chars.next_if_eq(&'(').is_some() {
                let nested = self.terms(true)?;
                if nested.is_empty() {
                    bail!("Empty nested build class expression: {:?}", self.input);
                }
                Operand::Nested(nested)
            } else {
                Operand::Class(self.class_name()?)
            };

            terms.push(ClassTerm {
                operation,
                inverted,
                operand,
            });
        }

        Ok(terms)
    }
}
