use crate::eval::evaluator::ConditionResult;
use crate::TargetingRule;

#[derive(Default)]
pub struct EvalLogBuilder {
    content: String,
    indent: usize,
}

impl EvalLogBuilder {
    const NEW_LINE_CHAR: char = '\n';
    const INDENT_SEQ: &'static str = "  ";

    pub fn inc_indent(&mut self) -> &mut Self {
        self.indent += 1;
        self
    }

    pub fn dec_indent(&mut self) -> &mut Self {
        self.indent = self.indent.saturating_sub(1);
        self
    }

    pub fn new_ln(&mut self, message: Option<&str>) -> &mut Self {
        self.content.push(Self::NEW_LINE_CHAR);
        self.content
            .push_str(Self::INDENT_SEQ.repeat(self.indent).as_str());
        if let Some(msg) = message {
            self.content.push_str(msg);
        }
        self
    }

    pub fn append(&mut self, val: &str) -> &mut Self {
        self.content.push_str(val);
        self
    }

    pub fn append_then_clause(
        &mut self,
        new_line: bool,
        result: &ConditionResult,
        rule: &TargetingRule,
    ) -> &mut Self {
        self.inc_indent();
        if new_line {
            self.new_ln(None);
        } else {
            self.append(" ");
        }
        self.append("THEN");
        if let Some(sv) = rule.served_value.as_ref() {
            self.append(format!(" '{}'", sv.value).as_str());
        } else {
            self.append(" % options");
        }
        self.append(" => ");
        match result {
            ConditionResult::Done(true) => self.append("MATCH, applying rule"),
            ConditionResult::Done(false) => self.append("no match"),
            _ => self.append(format!("{result}").as_str()),
        };
        if !result.is_ok() {
            self.new_ln(Some("The current targeting rule is ignored and the evaluation continues with the next rule."));
        }
        self.dec_indent()
    }

    pub fn content(&self) -> &str {
        self.content.as_str()
    }
}
