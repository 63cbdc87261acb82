//! Boolean expression algebra over opaque symbols.
//!
//! Used to reason about control-flow predicates during
//! desequentialisation. Expressions are plain trees; negation is a
//! wrapper node that [`negate`](BoolExpr::negate) attaches or strips.
//! [`disjunctive_cnf`](BoolExpr::disjunctive_cnf) normalises into a
//! disjunction of possibly-negated conjunctions over symbols.

use core::cmp::Ordering;

/// A boolean expression over symbols of type `S`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoolExpr<S> {
    /// The constant false.
    Const0,
    /// The constant true.
    Const1,
    /// An opaque symbol, compared by the symbol's own order.
    Symbol(S),
    /// Conjunction of the children.
    And(Vec<BoolExpr<S>>),
    /// Disjunction of the children.
    Or(Vec<BoolExpr<S>>),
    /// Negation of the inner expression.
    Not(Box<BoolExpr<S>>),
}

impl<S: Clone + Eq + Ord> BoolExpr<S> {
    /// A conjunction; empty input yields the constant true.
    pub fn and(children: Vec<BoolExpr<S>>) -> Self {
        match children.len() {
            0 => BoolExpr::Const1,
            1 => children.into_iter().next().expect("one child"),
            _ => BoolExpr::And(children),
        }
    }

    /// A disjunction; empty input yields the constant false.
    pub fn or(children: Vec<BoolExpr<S>>) -> Self {
        match children.len() {
            0 => BoolExpr::Const0,
            1 => children.into_iter().next().expect("one child"),
            _ => BoolExpr::Or(children),
        }
    }

    /// Attach a negation, or strip one that is already there.
    pub fn negate(self) -> Self {
        match self {
            BoolExpr::Not(inner) => *inner,
            other => BoolExpr::Not(Box::new(other)),
        }
    }

    /// Whether this is one of the two constants.
    pub const fn is_const(&self) -> bool {
        matches!(self, BoolExpr::Const0 | BoolExpr::Const1)
    }

    fn rank(&self) -> u8 {
        match self {
            BoolExpr::Const0 => 0,
            BoolExpr::Const1 => 1,
            BoolExpr::Symbol(_) => 2,
            BoolExpr::And(_) => 3,
            BoolExpr::Or(_) => 4,
            BoolExpr::Not(inner) => inner.rank(),
        }
    }

    fn negated(&self) -> bool {
        matches!(self, BoolExpr::Not(_))
    }

    fn base(&self) -> &Self {
        match self {
            BoolExpr::Not(inner) => inner,
            other => other,
        }
    }

    fn child_count(&self) -> usize {
        match self.base() {
            BoolExpr::And(cs) | BoolExpr::Or(cs) => cs.len(),
            _ => 0,
        }
    }

    /// The canonical total order: kind first, then child count, then
    /// recursively children or symbol identity. Negation breaks the tie
    /// on otherwise-equal expressions only, so `a` and `¬a` always end
    /// up adjacent no matter what else sorts around them.
    fn canonical_cmp(&self, other: &Self, ignore_negation: bool) -> Ordering {
        let by_kind = self.rank().cmp(&other.rank());
        if by_kind != Ordering::Equal {
            return by_kind;
        }
        let by_count = self.child_count().cmp(&other.child_count());
        if by_count != Ordering::Equal {
            return by_count;
        }
        let by_content = match (self.base(), other.base()) {
            (BoolExpr::Symbol(a), BoolExpr::Symbol(b)) => a.cmp(b),
            (BoolExpr::And(xs), BoolExpr::And(ys)) | (BoolExpr::Or(xs), BoolExpr::Or(ys)) => {
                xs.iter()
                    .zip(ys)
                    .map(|(x, y)| x.canonical_cmp(y, false))
                    .find(|c| *c != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            }
            _ => Ordering::Equal,
        };
        if by_content != Ordering::Equal || ignore_negation {
            return by_content;
        }
        self.negated().cmp(&other.negated())
    }

    fn simplify(self) -> Self {
        match self {
            BoolExpr::Not(inner) => match inner.simplify() {
                BoolExpr::Const0 => BoolExpr::Const1,
                BoolExpr::Const1 => BoolExpr::Const0,
                // Double negation.
                BoolExpr::Not(x) => *x,
                // De Morgan, then re-simplify the flipped node.
                BoolExpr::And(cs) => {
                    BoolExpr::Or(cs.into_iter().map(BoolExpr::negate).collect()).simplify()
                }
                BoolExpr::Or(cs) => {
                    BoolExpr::And(cs.into_iter().map(BoolExpr::negate).collect()).simplify()
                }
                leaf => BoolExpr::Not(Box::new(leaf)),
            },
            BoolExpr::And(cs) => Self::simplify_nary(true, cs),
            BoolExpr::Or(cs) => Self::simplify_nary(false, cs),
            leaf => leaf,
        }
    }

    fn simplify_nary(is_and: bool, children: Vec<BoolExpr<S>>) -> Self {
        let mask = if is_and {
            BoolExpr::Const0
        } else {
            BoolExpr::Const1
        };
        let identity = if is_and {
            BoolExpr::Const1
        } else {
            BoolExpr::Const0
        };
        // Flatten same-kind children while simplifying.
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
            match child.simplify() {
                BoolExpr::And(gs) if is_and => flat.extend(gs),
                BoolExpr::Or(gs) if !is_and => flat.extend(gs),
                other => flat.push(other),
            }
        }
        flat.sort_by(|a, b| a.canonical_cmp(b, false));
        if flat.iter().any(|c| *c == mask) {
            return mask;
        }
        flat.retain(|c| *c != identity);
        flat.dedup();
        // Complementation: the sort puts a and ¬a next to each other.
        for pair in flat.windows(2) {
            if pair[0].canonical_cmp(&pair[1], true) == Ordering::Equal && pair[0] != pair[1] {
                return mask;
            }
        }
        match flat.len() {
            0 => identity,
            1 => flat.into_iter().next().expect("one child"),
            _ if is_and => BoolExpr::And(flat),
            _ => BoolExpr::Or(flat),
        }
    }

    /// Distribute conjunctions over nested disjunctions, bottom up.
    fn distribute(self) -> Self {
        match self {
            BoolExpr::And(cs) => {
                let mut cs: Vec<BoolExpr<S>> =
                    cs.into_iter().map(BoolExpr::distribute).collect();
                if let Some(pos) = cs.iter().position(|c| matches!(c, BoolExpr::Or(_))) {
                    let alts = match cs.remove(pos) {
                        BoolExpr::Or(alts) => alts,
                        _ => unreachable!(),
                    };
                    let products = alts
                        .into_iter()
                        .map(|alt| {
                            let mut term = cs.clone();
                            term.push(alt);
                            BoolExpr::And(term).distribute()
                        })
                        .collect();
                    BoolExpr::Or(products)
                } else {
                    BoolExpr::And(cs)
                }
            }
            BoolExpr::Or(cs) => {
                BoolExpr::Or(cs.into_iter().map(BoolExpr::distribute).collect())
            }
            other => other,
        }
    }

    /// Normalise into a disjunction of possibly-negated conjunctions of
    /// symbols, applying the full rule set until a fixed point.
    pub fn disjunctive_cnf(self) -> Self {
        let mut expr = self.simplify();
        loop {
            let next = expr.clone().distribute().simplify();
            if next == expr {
                return expr;
            }
            expr = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;

    type E = BoolExpr<u8>;

    fn sym(s: u8) -> E {
        BoolExpr::Symbol(s)
    }

    #[test]
    fn negated_constants_resolve() {
        assert_eq!(E::Const0.negate().disjunctive_cnf(), E::Const1);
        assert_eq!(E::Const1.negate().disjunctive_cnf(), E::Const0);
    }

    #[test]
    fn double_negation_strips() {
        let e = sym(1).negate().negate();
        assert_eq!(e.disjunctive_cnf(), sym(1));
    }

    #[test]
    fn de_morgan() {
        let e = E::and(vec![sym(1), sym(2)]).negate().disjunctive_cnf();
        assert_eq!(e, E::or(vec![sym(1).negate(), sym(2).negate()]));
    }

    #[test]
    fn masking_and_identity() {
        assert_eq!(
            E::and(vec![sym(1), E::Const0]).disjunctive_cnf(),
            E::Const0
        );
        assert_eq!(E::and(vec![sym(1), E::Const1]).disjunctive_cnf(), sym(1));
        assert_eq!(E::or(vec![sym(1), E::Const1]).disjunctive_cnf(), E::Const1);
        assert_eq!(E::or(vec![sym(1), E::Const0]).disjunctive_cnf(), sym(1));
    }

    #[test]
    fn duplicates_collapse() {
        assert_eq!(E::and(vec![sym(3), sym(3)]).disjunctive_cnf(), sym(3));
        assert_eq!(E::or(vec![sym(3), sym(3)]).disjunctive_cnf(), sym(3));
    }

    #[test]
    fn complementation() {
        assert_eq!(
            E::and(vec![sym(1), sym(1).negate()]).disjunctive_cnf(),
            E::Const0
        );
        assert_eq!(
            E::or(vec![sym(1), sym(1).negate()]).disjunctive_cnf(),
            E::Const1
        );
    }

    #[test]
    fn complementation_with_other_symbols_between() {
        // The complementary pair must be found even when further
        // symbols sort around it.
        assert_eq!(
            E::and(vec![sym(1), sym(2), sym(1).negate()]).disjunctive_cnf(),
            E::Const0
        );
        assert_eq!(
            E::and(vec![sym(0), sym(2), sym(1).negate(), sym(1), sym(3)]).disjunctive_cnf(),
            E::Const0
        );
        assert_eq!(
            E::or(vec![sym(1), sym(2), sym(1).negate()]).disjunctive_cnf(),
            E::Const1
        );
        // The nested accumulation shape the block-condition analysis
        // produces: a contradictory path condition collapses, and the
        // disjunction of the two live paths keeps only them.
        let dead = E::and(vec![
            E::and(vec![sym(1), sym(2)]),
            sym(1).negate(),
        ]);
        let live = E::and(vec![E::and(vec![sym(1), sym(2)]), sym(3)]);
        let e = E::or(vec![dead, live]).disjunctive_cnf();
        assert_eq!(e, E::And(vec![sym(1), sym(2), sym(3)]));
    }

    #[test]
    fn nested_flattening_and_sorting() {
        let e = E::and(vec![
            sym(2),
            E::and(vec![sym(1), E::and(vec![sym(3)])]),
        ])
        .disjunctive_cnf();
        assert_eq!(e, E::And(vec![sym(1), sym(2), sym(3)]));
    }

    #[test]
    fn distribution_yields_sum_of_products() {
        // (a | b) & c  =>  (a & c) | (b & c)
        let e = E::and(vec![E::or(vec![sym(1), sym(2)]), sym(3)]).disjunctive_cnf();
        assert_eq!(
            e,
            E::Or(vec![
                E::And(vec![sym(1), sym(3)]),
                E::And(vec![sym(2), sym(3)]),
            ])
        );
    }

    #[test]
    fn gated_clock_shape() {
        // The clock-gating condition ¬ck | (ck & q) stays in DNF.
        let e = E::or(vec![
            sym(1).negate(),
            E::and(vec![sym(1), sym(2)]),
        ])
        .disjunctive_cnf();
        assert_eq!(
            e,
            E::Or(vec![
                sym(1).negate(),
                E::And(vec![sym(1), sym(2)]),
            ])
        );
    }

    impl Arbitrary for E {
        fn arbitrary(g: &mut Gen) -> Self {
            fn gen(g: &mut Gen, depth: usize) -> E {
                let choice = u8::arbitrary(g) % if depth == 0 { 3 } else { 6 };
                match choice {
                    0 => E::Const0,
                    1 => E::Const1,
                    2 => E::Symbol(u8::arbitrary(g) % 4),
                    3 => E::Not(Box::new(gen(g, depth - 1))),
                    4 => E::And((0..2 + usize::arbitrary(g) % 2).map(|_| gen(g, depth - 1)).collect()),
                    _ => E::Or((0..2 + usize::arbitrary(g) % 2).map(|_| gen(g, depth - 1)).collect()),
                }
            }
            gen(g, 3)
        }
    }

    #[quickcheck]
    fn normalisation_is_idempotent(e: E) -> bool {
        let once = e.disjunctive_cnf();
        once.clone().disjunctive_cnf() == once
    }

    #[quickcheck]
    fn normal_form_shape(e: E) -> bool {
        fn is_literal(e: &E) -> bool {
            matches!(e.base(), E::Const0 | E::Const1 | E::Symbol(_))
        }
        fn is_product(e: &E) -> bool {
            match e {
                E::And(cs) => cs.iter().all(is_literal),
                other => is_literal(other),
            }
        }
        match e.disjunctive_cnf() {
            E::Or(cs) => cs.iter().all(is_product),
            other => is_product(&other),
        }
    }

    /// Evaluate under an assignment of the four generator symbols.
    fn eval(e: &E, assignment: u8) -> bool {
        match e {
            E::Const0 => false,
            E::Const1 => true,
            E::Symbol(s) => assignment & (1 << s) != 0,
            E::Not(inner) => !eval(inner, assignment),
            E::And(cs) => cs.iter().all(|c| eval(c, assignment)),
            E::Or(cs) => cs.iter().any(|c| eval(c, assignment)),
        }
    }

    #[quickcheck]
    fn normalisation_preserves_the_truth_table(e: E) -> bool {
        let normalised = e.clone().disjunctive_cnf();
        (0u8..16).all(|assignment| eval(&e, assignment) == eval(&normalised, assignment))
    }

    #[quickcheck]
    fn unsatisfiable_expressions_normalise_to_false(e: E) -> bool {
        // Every product of an unsatisfiable formula carries a
        // complementary pair, so distribution plus complementation must
        // always find the bottom.
        let unsat = (0u8..16).all(|assignment| !eval(&e, assignment));
        !unsat || e.disjunctive_cnf() == E::Const0
    }
}
