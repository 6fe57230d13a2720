//! Lake rewriter
//!
//! A lake `<<island>>` matches any run of text in which occurrences of the
//! island are recognized. The text between islands is *water*. The rewriter
//! makes water concrete: for every group of lakes it synthesizes a rule
//!
//! ```text
//! <symbol>$water <- !(alt_1 / ... / alt_n) (water_1 / ... / .)
//! ```
//!
//! where `alt_i` are the symbols a parser could be looking for where the lake
//! is being matched (its Alt set, computed in [`Mode::Lake`]) and `water_i`
//! are the user's water rules. Water therefore stops exactly where something
//! the surrounding grammar recognizes begins.
//!
//! Lakes are grouped by island symbol, so every `<<item>>` in a grammar shares
//! one water rule. Nested lake markers in an alternative set are replaced by
//! what that lake would be looking for, transitively, and then removed: a lake
//! never excludes itself. The same holds for rules that can begin with one of
//! the group's lakes, such as `stmt` in `doc <- stmt*; stmt <- <<call>> ';'`.
//!
//! # Example
//!
//! ```
//! use lakepeg::peg::{lake, loader, packrat};
//!
//! let mut grammar = loader::load("doc <- <<num>> ';'\nnum <- [0-9]+").unwrap();
//! let report = lake::rewrite_lakes(&mut grammar, &[]).unwrap();
//! assert_eq!(report.groups.len(), 1);
//!
//! let tree = packrat::parse(&grammar, "a 12 b 7;", None).unwrap();
//! let islands: Vec<&str> = tree.find_all("num").into_iter().map(|n| tree.text(n)).collect();
//! assert_eq!(islands, ["12", "7"]);
//! ```

use crate::peg::builder::ANY_CHAR_PATTERN;
use crate::peg::error::GrammarError;
use crate::peg::grammar::{Expr, ExprId, Grammar, LakeWater, RuleId};
use crate::peg::sets::{GrammarSets, Marker, MarkerSet, Mode, SetCalculator};
use ahash::AHashSet;
use hashbrown::HashMap;

/// One group of lakes sharing an island symbol and a water rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LakeGroup {
    /// Island symbol, or `lake<N>` for a lake whose operand is not a
    /// nonterminal
    pub key: String,
    /// Lakes in the group
    pub lakes: Vec<ExprId>,
    /// Synthesized water rule
    pub water_rule: RuleId,
    /// Guard expressions the water rule refuses to start at
    pub alternatives: Vec<ExprId>,
}

/// Outcome of [`rewrite_lakes`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LakeReport {
    /// Every lake rewritten, in expression order
    pub lakes: Vec<ExprId>,
    /// User water rules used as filler
    pub water_rules: Vec<RuleId>,
    /// Groups, in order of their first lake
    pub groups: Vec<LakeGroup>,
}

impl LakeReport {
    /// True if the grammar had no lakes left to rewrite
    pub fn is_empty(&self) -> bool {
        self.lakes.is_empty()
    }
}

#[derive(Debug, PartialEq, Eq, Hash)]
enum GuardKey {
    Rule(RuleId),
    Pattern(String),
}

/// Rewrite every lake that has no water yet
///
/// `water_symbols` name extra water rules on top of the rules already
/// flagged as water. Rewriting twice is harmless: lakes rewritten earlier
/// keep their water.
pub fn rewrite_lakes(
    grammar: &mut Grammar,
    water_symbols: &[&str],
) -> Result<LakeReport, GrammarError> {
    let water_rules = collect_water_rules(grammar, water_symbols)?;

    let lakes: Vec<ExprId> = grammar
        .exprs()
        .filter(|(_, e)| matches!(e, Expr::Lake { water: None, .. }))
        .map(|(id, _)| id)
        .collect();
    if lakes.is_empty() {
        return Ok(LakeReport {
            water_rules,
            ..LakeReport::default()
        });
    }

    let sets = SetCalculator::new(grammar, Mode::Lake).analyze();

    // Group lakes by island symbol
    let mut keys: Vec<String> = Vec::new();
    let mut members: Vec<Vec<ExprId>> = Vec::new();
    let mut group_of: HashMap<ExprId, usize> = HashMap::new();
    for &lake in &lakes {
        let key = group_key(grammar, lake);
        let group = match keys.iter().position(|k| *k == key) {
            Some(group) => group,
            None => {
                keys.push(key);
                members.push(Vec::new());
                keys.len() - 1
            }
        };
        members[group].push(lake);
        group_of.insert(lake, group);
    }

    let alternatives = expand_alternatives(grammar, &sets, &members, &group_of);

    let mut groups = Vec::with_capacity(keys.len());
    for ((key, lakes), alts) in keys.into_iter().zip(members).zip(alternatives) {
        let guards = materialize_guards(grammar, &sets, &lakes, &alts);
        let water_rule = add_water_rule(grammar, &key, &guards, &water_rules)?;
        let water = grammar.add_expr(Expr::Nonterminal {
            symbol: grammar.rule(water_rule).symbol.clone(),
            rule: Some(water_rule),
            binding: None,
        });
        for &lake in &lakes {
            if let Expr::Lake { water: slot, .. } = grammar.expr_mut(lake) {
                *slot = Some(LakeWater {
                    water,
                    alternatives: guards.clone(),
                    water_rules: water_rules.clone(),
                });
            }
        }
        log_debug!(
            "lake group '{}': {} lakes, {} guards, water rule '{}'",
            key,
            lakes.len(),
            guards.len(),
            grammar.rule(water_rule).symbol
        );
        groups.push(LakeGroup {
            key,
            lakes,
            water_rule,
            alternatives: guards,
        });
    }

    Ok(LakeReport {
        lakes,
        water_rules,
        groups,
    })
}

fn collect_water_rules(
    grammar: &Grammar,
    water_symbols: &[&str],
) -> Result<Vec<RuleId>, GrammarError> {
    let mut rules = Vec::new();
    for symbol in water_symbols {
        let rule = grammar
            .rule_by_symbol(symbol)
            .ok_or_else(|| GrammarError::UnknownWaterSymbol {
                symbol: symbol.to_string(),
            })?;
        if !rules.contains(&rule) {
            rules.push(rule);
        }
    }
    for (id, rule) in grammar.rules() {
        if rule.water && !rules.contains(&id) {
            rules.push(id);
        }
    }
    Ok(rules)
}

fn group_key(grammar: &Grammar, lake: ExprId) -> String {
    match grammar.expr(lake) {
        Expr::Lake { expr, .. } => match grammar.expr(*expr) {
            Expr::Nonterminal { symbol, .. } => symbol.clone(),
            _ => format!("lake{}", lake.index()),
        },
        _ => unreachable!("group_key called on a non-lake expression"),
    }
}

fn lake_operand(grammar: &Grammar, lake: ExprId) -> Option<ExprId> {
    match grammar.expr(lake) {
        Expr::Lake { expr, .. } => Some(*expr),
        _ => None,
    }
}

/// Alternative set per group, nested lakes expanded and then stripped
fn expand_alternatives(
    grammar: &Grammar,
    sets: &GrammarSets,
    members: &[Vec<ExprId>],
    group_of: &HashMap<ExprId, usize>,
) -> Vec<MarkerSet> {
    let mut alts: Vec<MarkerSet> = members
        .iter()
        .map(|lakes| {
            lakes
                .iter()
                .flat_map(|lake| sets.alt.get(*lake).iter().copied())
                .filter(|m| *m != Marker::Epsilon)
                .collect()
        })
        .collect();

    let is_lake = |id: ExprId| matches!(grammar.expr(id), Expr::Lake { .. });
    loop {
        let mut changed = false;
        for group in 0..alts.len() {
            let nested: Vec<ExprId> = alts[group]
                .iter()
                .filter_map(|m| match m {
                    Marker::Symbol(id) if is_lake(*id) => Some(*id),
                    _ => None,
                })
                .collect();
            let mut added = MarkerSet::new();
            for lake in nested {
                if let Some(&other) = group_of.get(&lake) {
                    added.extend(alts[other].iter().copied());
                }
                if let Some(operand) = lake_operand(grammar, lake) {
                    added.extend(sets.beginning.get(operand).iter().copied());
                }
            }
            added.remove(&Marker::Epsilon);
            let before = alts[group].len();
            alts[group].extend(added);
            changed |= alts[group].len() != before;
        }
        if !changed {
            break;
        }
    }
    log_trace!("lake alternative sets converged for {} groups", alts.len());

    for set in &mut alts {
        set.retain(|m| matches!(m, Marker::Symbol(id) if !is_lake(*id)));
    }
    alts
}

/// True if `rule` can begin with one of `lakes`
fn begins_with_lake(grammar: &Grammar, sets: &GrammarSets, rule: RuleId, lakes: &[ExprId]) -> bool {
    let mut visited = AHashSet::new();
    let mut stack = vec![rule];
    while let Some(rule) = stack.pop() {
        if !visited.insert(rule) {
            continue;
        }
        for marker in sets.beginning.get(grammar.rule(rule).rhs) {
            let Marker::Symbol(id) = *marker else {
                continue;
            };
            if lakes.contains(&id) {
                return true;
            }
            if let Expr::Nonterminal { rule: Some(next), .. } = grammar.expr(id) {
                stack.push(*next);
            }
        }
    }
    false
}

/// Guard expressions for one alternative set, one per rule and per pattern
fn materialize_guards(
    grammar: &mut Grammar,
    sets: &GrammarSets,
    lakes: &[ExprId],
    alts: &MarkerSet,
) -> Vec<ExprId> {
    let mut seen = AHashSet::new();
    let mut guards = Vec::new();
    for marker in alts {
        let Marker::Symbol(id) = *marker else {
            continue;
        };
        match grammar.expr(id).clone() {
            Expr::Nonterminal {
                symbol,
                rule: Some(rule),
                ..
            } => {
                if begins_with_lake(grammar, sets, rule, lakes) {
                    seen.insert(GuardKey::Rule(rule));
                    continue;
                }
                if seen.insert(GuardKey::Rule(rule)) {
                    guards.push(grammar.add_expr(Expr::Nonterminal {
                        symbol,
                        rule: Some(rule),
                        binding: None,
                    }));
                }
            }
            Expr::Terminal { pattern, .. } => {
                if seen.insert(GuardKey::Pattern(pattern)) {
                    guards.push(id);
                }
            }
            // unresolved island symbols never match, so they guard nothing
            _ => {}
        }
    }
    guards
}

fn add_water_rule(
    grammar: &mut Grammar,
    key: &str,
    guards: &[ExprId],
    water_rules: &[RuleId],
) -> Result<RuleId, GrammarError> {
    let mut fillers = Vec::with_capacity(water_rules.len() + 1);
    for &rule in water_rules {
        let symbol = grammar.rule(rule).symbol.clone();
        fillers.push(grammar.add_expr(Expr::Nonterminal {
            symbol,
            rule: Some(rule),
            binding: None,
        }));
    }
    fillers.push(grammar.add_expr(Expr::Terminal {
        pattern: ANY_CHAR_PATTERN.to_string(),
        source: ".".to_string(),
    }));
    let filler = grammar.add_expr(Expr::Choice {
        alternatives: fillers,
    });

    let body = if guards.is_empty() {
        filler
    } else {
        let choice = grammar.add_expr(Expr::Choice {
            alternatives: guards.to_vec(),
        });
        let guard = grammar.add_expr(Expr::Not { expr: choice });
        grammar.add_expr(Expr::Sequence {
            items: vec![guard, filler],
        })
    };

    let base = format!("{}$water", key);
    let mut symbol = base.clone();
    let mut suffix = 1;
    while grammar.rule_by_symbol(&symbol).is_some() {
        suffix += 1;
        symbol = format!("{}{}", base, suffix);
    }
    let rule = grammar.add_rule(symbol, body, false)?;
    grammar.rule_mut(rule).generated = true;
    Ok(rule)
}
