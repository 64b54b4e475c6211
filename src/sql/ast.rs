use std::cmp::Ordering;

/// What a SELECT projects per matching tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectAttr {
    Key,
    Value,
    All,
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondAttr {
    Key,
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl CompOp {
    /// Whether an attribute comparing to the literal as `ord` satisfies
    /// this operator.
    pub fn accepts(&self, ord: Ordering) -> bool {
        match self {
            CompOp::Eq => ord == Ordering::Equal,
            CompOp::Ne => ord != Ordering::Equal,
            CompOp::Lt => ord == Ordering::Less,
            CompOp::Gt => ord == Ordering::Greater,
            CompOp::Le => ord != Ordering::Greater,
            CompOp::Ge => ord != Ordering::Less,
        }
    }
}

/// One WHERE term: `key|value <op> literal`. Key literals are validated
/// as integers at parse time but kept as text here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub attr: CondAttr,
    pub op: CompOp,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Select {
        attr: SelectAttr,
        table: String,
        conds: Vec<Condition>,
    },
    Load {
        table: String,
        file: String,
        with_index: bool,
    },
    Quit,
}
