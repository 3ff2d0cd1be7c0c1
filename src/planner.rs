//! Regex n-gram planner.
//!
//! Compiles a regex into a boolean expression over n-gram keys that any
//! string the regex matches must satisfy, for use as an index prefilter.
//! Walks the regex's high-level IR (`regex_syntax::hir::Hir`) rather than the
//! raw AST — literal runs already arrive pre-merged there, which matters
//! because the extractor (`ngram.rs`) must see the same token boundaries the
//! indexer saw (no_tokenize: whole strings, not per-character).

use std::collections::BTreeSet;

use regex_syntax::hir::{Hir, HirKind, Literal};

use crate::error::SearchError;
use crate::ngram::extract_ngrams;

const MAX_EXACT_CROSS: usize = 16;

/// One conjunct of the final plan: either a single required n-gram, or a
/// disjunction where at least one of the listed n-grams must be present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    Required(String),
    AnyOf(Vec<String>),
}

/// `None` means the planner found no useful constraint (the `ANY`/⊤ lattice
/// value) — the caller should skip the index filter and fall back to a full
/// verification pass.
pub type Plan = Option<Vec<Clause>>;

#[derive(Debug, Clone)]
enum Lattice {
    Empty,
    Exact(BTreeSet<String>),
    Grams(Expr),
    Any,
}

#[derive(Debug, Clone)]
enum Expr {
    Gram(String),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

/// Compiles `pattern` into a sound index plan, deriving grams with the same
/// `k` the indexer uses.
pub fn plan_regex(pattern: &str, k: usize) -> Result<Plan, SearchError> {
    let hir = regex_syntax::Parser::new()
        .parse(pattern)
        .map_err(|e| SearchError::InvalidRegex {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
    let lattice = reduce(&hir, k);
    Ok(finalize(lattice, k))
}

fn finalize(lattice: Lattice, k: usize) -> Plan {
    let expr = to_expr(lattice, k)?;
    let clauses = to_clauses(&flatten(expr));
    if clauses.is_empty() {
        None
    } else {
        Some(clauses)
    }
}

fn reduce(hir: &Hir, k: usize) -> Lattice {
    match hir.kind() {
        HirKind::Empty => Lattice::Empty,
        HirKind::Literal(Literal(bytes)) => {
            let s = String::from_utf8_lossy(bytes).into_owned();
            Lattice::Exact([s].into_iter().collect())
        }
        HirKind::Class(_) => Lattice::Any,
        HirKind::Look(_) => Lattice::Empty,
        HirKind::Repetition(rep) => {
            if rep.min == 0 {
                Lattice::Any
            } else {
                reduce(&rep.sub, k)
            }
        }
        HirKind::Capture(cap) => reduce(&cap.sub, k),
        HirKind::Concat(parts) => parts
            .iter()
            .map(|p| reduce(p, k))
            .fold(Lattice::Empty, |acc, next| concat(acc, next, k)),
        HirKind::Alternation(parts) => {
            let mut iter = parts.iter().map(|p| reduce(p, k));
            match iter.next() {
                None => Lattice::Any,
                Some(first) => iter.fold(first, |acc, next| alternate(acc, next, k)),
            }
        }
    }
}

fn concat(a: Lattice, b: Lattice, k: usize) -> Lattice {
    match (a, b) {
        (Lattice::Empty, x) | (x, Lattice::Empty) => x,
        (Lattice::Exact(sa), Lattice::Exact(sb))
            if sa.len().saturating_mul(sb.len()) <= MAX_EXACT_CROSS =>
        {
            let mut out = BTreeSet::new();
            for x in &sa {
                for y in &sb {
                    out.insert(format!("{x}{y}"));
                }
            }
            Lattice::Exact(out)
        }
        (a, b) => and_lattice(a, b, k),
    }
}

fn and_lattice(a: Lattice, b: Lattice, k: usize) -> Lattice {
    match (to_expr(a, k), to_expr(b, k)) {
        (None, None) => Lattice::Any,
        (Some(e), None) | (None, Some(e)) => Lattice::Grams(e),
        (Some(e1), Some(e2)) => Lattice::Grams(Expr::And(vec![e1, e2])),
    }
}

fn alternate(a: Lattice, b: Lattice, k: usize) -> Lattice {
    match (a, b) {
        (Lattice::Empty, _) | (_, Lattice::Empty) => Lattice::Any,
        (Lattice::Any, _) | (_, Lattice::Any) => Lattice::Any,
        (Lattice::Exact(sa), Lattice::Exact(sb)) => {
            let mut out = sa;
            out.extend(sb);
            Lattice::Exact(out)
        }
        (a, b) => {
            let ea = to_expr(a, k).expect("non-empty, non-any branch always yields an Expr");
            let eb = to_expr(b, k).expect("non-empty, non-any branch always yields an Expr");
            Lattice::Grams(Expr::Or(vec![ea, eb]))
        }
    }
}

/// Converts a lattice value to a gram-formula, or `None` if it contributes no
/// constraint (`Empty`/`Any`).
fn to_expr(lattice: Lattice, k: usize) -> Option<Expr> {
    match lattice {
        Lattice::Empty | Lattice::Any => None,
        Lattice::Exact(set) => Some(exact_to_expr(&set, k)),
        Lattice::Grams(e) => Some(e),
    }
}

fn exact_to_expr(set: &BTreeSet<String>, k: usize) -> Expr {
    let branches: Vec<Expr> = set
        .iter()
        .map(|s| {
            let grams = extract_ngrams(s, k);
            Expr::And(grams.into_iter().map(Expr::Gram).collect())
        })
        .collect();
    if branches.len() == 1 {
        branches.into_iter().next().unwrap()
    } else {
        Expr::Or(branches)
    }
}

fn flatten(expr: Expr) -> Expr {
    match expr {
        Expr::Gram(g) => Expr::Gram(g),
        Expr::And(parts) => {
            let mut flat = Vec::new();
            for p in parts {
                match flatten(p) {
                    Expr::And(inner) => flat.extend(inner),
                    other => flat.push(other),
                }
            }
            Expr::And(flat)
        }
        Expr::Or(parts) => {
            let mut flat = Vec::new();
            for p in parts {
                match flatten(p) {
                    Expr::Or(inner) => flat.extend(inner),
                    other => flat.push(other),
                }
            }
            Expr::Or(flat)
        }
    }
}

/// Converts a gram formula into a flat list of clauses: an AND of terms,
/// each either a single required gram or a disjunction.
///
/// Soundness drives the shape of this reduction: inside an `And`, a conjunct
/// that can't be represented cleanly is simply dropped (a necessary condition
/// lost is still sound — it only widens the candidate set). Inside an `Or`,
/// a branch that isn't a bare gram can't be safely dropped (that would
/// exclude true matches), so the whole disjunction is abandoned instead.
fn to_clauses(expr: &Expr) -> Vec<Clause> {
    match expr {
        Expr::Gram(g) => vec![Clause::Required(g.clone())],
        Expr::And(parts) => {
            let mut all = Vec::new();
            for p in parts {
                all.extend(to_clauses(p));
            }
            all
        }
        Expr::Or(parts) => {
            let mut grams = Vec::with_capacity(parts.len());
            for p in parts {
                match p {
                    Expr::Gram(g) => grams.push(g.clone()),
                    _ => return Vec::new(),
                }
            }
            if grams.is_empty() {
                Vec::new()
            } else {
                vec![Clause::AnyOf(grams)]
            }
        }
    }
}
