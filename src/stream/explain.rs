//! Explain output
//!
//! Every stream describes itself as a `PlanNode`; the tree of nodes mirrors
//! the realized operator chain. `ExplainPlan` renders it, or the rejection
//! of a query that failed to plan.

use std::fmt;

use crate::error::QueryError;

use super::BlockStream;

/// One operator of the realized pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanNode {
    pub name: String,
    pub details: Vec<String>,
    pub children: Vec<PlanNode>,
}

impl PlanNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            details: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.details.push(detail.into());
        self
    }

    pub fn child(mut self, child: PlanNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = PlanNode>) -> Self {
        self.children.extend(children);
        self
    }

    /// Depth-first search for a node by name
    pub fn find(&self, name: &str) -> Option<&PlanNode> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }

    /// Number of nodes with the given name
    pub fn count(&self, name: &str) -> usize {
        let own = usize::from(self.name == name);
        own + self.children.iter().map(|c| c.count(name)).sum::<usize>()
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(f, "{}{}", "  ".repeat(depth), self.name)?;
        if !self.details.is_empty() {
            write!(f, " ({})", self.details.join("; "))?;
        }
        writeln!(f)?;
        for child in &self.children {
            child.write_tree(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(f, 0)
    }
}

/// Explain report for a planned or rejected query
#[derive(Debug, Clone)]
pub struct ExplainPlan {
    pub accepted: bool,
    /// `name Type` of every output column
    pub output: Vec<String>,
    pub root: Option<PlanNode>,
    pub rejection_code: Option<String>,
    pub rejection_reason: Option<String>,
}

impl ExplainPlan {
    pub fn from_stream(stream: &dyn BlockStream) -> Self {
        Self {
            accepted: true,
            output: stream
                .header()
                .defs()
                .iter()
                .map(|d| format!("{} {}", d.name, d.data_type))
                .collect(),
            root: Some(stream.explain()),
            rejection_code: None,
            rejection_reason: None,
        }
    }

    pub fn from_error(err: &QueryError) -> Self {
        Self {
            accepted: false,
            output: Vec::new(),
            root: None,
            rejection_code: Some(err.code().code().to_string()),
            rejection_reason: Some(err.message().to_string()),
        }
    }
}

impl fmt::Display for ExplainPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== EXPLAIN PLAN ===")?;
        if self.accepted {
            writeln!(f, "Status: ACCEPTED")?;
            writeln!(f, "Output: {}", self.output.join(", "))?;
            if let Some(root) = &self.root {
                writeln!(f, "Pipeline:")?;
                root.write_tree(f, 1)?;
            }
        } else {
            writeln!(f, "Status: REJECTED")?;
            if let Some(code) = &self.rejection_code {
                writeln!(f, "Error Code: {}", code)?;
            }
            if let Some(reason) = &self.rejection_reason {
                writeln!(f, "Reason: {}", reason)?;
            }
        }
        Ok(())
    }
}
