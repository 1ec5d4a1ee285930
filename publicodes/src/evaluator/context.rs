//! Evaluation context for one evaluation session
//!
//! Holds everything that changes while evaluating: the memo cache, the stack
//! of `contexte` frames, the rules being evaluated (for cycle detection) and
//! the seeds of circular references being solved.

use super::Evaluation;
use crate::error::PublicodesError;
use crate::resource_limits::ResourceLimits;
use crate::semantic::{DottedName, Expression, Rule};
use std::collections::{BTreeMap, HashMap};

/// Frame 0 is the plain situation; `contexte` and circular iterations push more
pub type FrameId = u64;

const BASE_FRAME: FrameId = 0;

struct Frame {
    id: FrameId,
    overrides: HashMap<DottedName, Evaluation>,
}

pub struct EvaluationContext<'a> {
    pub rules: &'a BTreeMap<DottedName, Rule>,
    /// Situation values, already compiled and resolved
    pub situation: &'a BTreeMap<DottedName, Expression>,
    pub limits: &'a ResourceLimits,
    /// Fail on incompatible units instead of logging a warning
    pub strict_units: bool,
    cache: HashMap<(DottedName, FrameId), Evaluation>,
    frames: Vec<Frame>,
    next_frame: FrameId,
    stack: Vec<DottedName>,
    seeds: HashMap<DottedName, Evaluation>,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(
        rules: &'a BTreeMap<DottedName, Rule>,
        situation: &'a BTreeMap<DottedName, Expression>,
        limits: &'a ResourceLimits,
    ) -> Self {
        Self {
            rules,
            situation,
            limits,
            strict_units: true,
            cache: HashMap::new(),
            frames: vec![Frame {
                id: BASE_FRAME,
                overrides: HashMap::new(),
            }],
            next_frame: BASE_FRAME + 1,
            stack: Vec::new(),
            seeds: HashMap::new(),
        }
    }

    pub fn with_strict_units(mut self, strict_units: bool) -> Self {
        self.strict_units = strict_units;
        self
    }

    /// Start from rule values computed by a previous session on the same
    /// situation
    pub fn with_base_cache(mut self, cache: HashMap<DottedName, Evaluation>) -> Self {
        self.cache.extend(
            cache
                .into_iter()
                .map(|(name, evaluation)| ((name, BASE_FRAME), evaluation)),
        );
        self
    }

    /// Rule values computed in the plain situation, reusable by later sessions
    pub fn into_base_cache(self) -> HashMap<DottedName, Evaluation> {
        self.cache
            .into_iter()
            .filter(|((_, frame), _)| *frame == BASE_FRAME)
            .map(|((name, _), evaluation)| (name, evaluation))
            .collect()
    }

    pub fn current_frame(&self) -> FrameId {
        self.frames.last().map(|frame| frame.id).unwrap_or(BASE_FRAME)
    }

    /// Open a frame where `overrides` replace the value of some rules
    pub fn push_frame(&mut self, overrides: HashMap<DottedName, Evaluation>) {
        let id = self.next_frame;
        self.next_frame += 1;
        self.frames.push(Frame { id, overrides });
    }

    /// Close the innermost frame and forget what was computed in it
    pub fn pop_frame(&mut self) {
        if self.frames.len() > 1 {
            if let Some(frame) = self.frames.pop() {
                self.cache.retain(|(_, id), _| *id != frame.id);
            }
        }
    }

    /// Value imposed by the innermost `contexte` mentioning `name`
    pub fn override_for(&self, name: &DottedName) -> Option<&Evaluation> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.overrides.get(name))
    }

    pub fn cached(&self, name: &DottedName) -> Option<&Evaluation> {
        self.cache.get(&(name.clone(), self.current_frame()))
    }

    pub fn store(&mut self, name: &DottedName, evaluation: Evaluation) {
        let frame = self.current_frame();
        self.cache.insert((name.clone(), frame), evaluation);
    }

    /// Mark `name` as being evaluated
    pub fn enter(&mut self, name: &DottedName) -> Result<(), PublicodesError> {
        if let Some(start) = self.stack.iter().position(|entry| entry == name) {
            let mut cycle: Vec<String> = self.stack[start..].iter().map(|n| n.to_string()).collect();
            cycle.push(name.to_string());
            return Err(PublicodesError::CircularReference { cycle });
        }
        if self.stack.len() >= self.limits.max_evaluation_depth {
            return Err(PublicodesError::ResourceLimitExceeded {
                limit_name: "max_evaluation_depth".to_string(),
                limit_value: self.limits.max_evaluation_depth.to_string(),
                actual_value: (self.stack.len() + 1).to_string(),
                suggestion: "Reduce the depth of rule dependencies".to_string(),
            });
        }
        self.stack.push(name.clone());
        Ok(())
    }

    pub fn leave(&mut self) {
        self.stack.pop();
    }

    /// Start a fresh evaluation stack, returning the current one. Rules
    /// already being evaluated may then be evaluated again from a seed.
    pub fn suspend_stack(&mut self) -> Vec<DottedName> {
        std::mem::take(&mut self.stack)
    }

    pub fn restore_stack(&mut self, stack: Vec<DottedName>) {
        self.stack = stack;
    }

    /// Current guess for a circular reference being solved
    pub fn seed(&self, name: &DottedName) -> Option<&Evaluation> {
        self.seeds.get(name)
    }

    pub fn set_seed(&mut self, name: &DottedName, seed: Evaluation) {
        self.seeds.insert(name.clone(), seed);
    }

    pub fn clear_seed(&mut self, name: &DottedName) {
        self.seeds.remove(name);
    }
}
