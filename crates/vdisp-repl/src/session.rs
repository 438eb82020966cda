//! REPL session state and command execution.
//!
//! A session owns a loaded [`Program`] plus the objects created at the
//! prompt. Every command goes through [`ReplSession::execute`], which is
//! what the line editor loop and the tests both drive.

use vdisp_front::{call_instance, call_object, LoadError, Program};
use vdisp_rt::{is_identifier, Instance, MethodId, Value};
use vdisp_script::eval_const;

/// What the loop should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Print the text.
    Print(String),
    /// Nothing to print.
    Silent,
    Quit,
}

pub const HELP: &str = "\
commands:
  let x = new Class(field: expr, ...)   construct an object
  x.method(args)                        call through x's own class
  x as Class.method(args)               call through an ancestor's slot
  table Class                           show a class's dispatch table
  tables                                show every table
  classes                               list classes
  slot Class signature                  show the slot of a method, e.g. `slot Dog speak()`
  vars                                  list objects
  help                                  show this text
  quit, exit                            leave
anything else is evaluated as a constant expression, e.g. `1 + 2 * 3`";

/// Persistent state for one interactive session.
#[derive(Default)]
pub struct ReplSession {
    program: Program,
    /// Objects created at the prompt, in creation order. Rebinding a name
    /// replaces its object in place.
    vars: Vec<(String, Instance)>,
}

impl ReplSession {
    pub fn new(program: Program) -> Self {
        Self {
            program,
            vars: Vec::new(),
        }
    }

    /// A session without any classes.
    pub fn empty() -> Self {
        Self::new(Program::default())
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Run one line of input.
    pub fn execute(&mut self, line: &str) -> Result<Output, String> {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(w, r)| (w, r.trim()));
        tracing::debug!(input = line, "repl command");
        match word {
            "" => Ok(Output::Silent),
            "quit" | "exit" if rest.is_empty() => Ok(Output::Quit),
            "help" if rest.is_empty() => Ok(Output::Print(HELP.to_string())),
            "classes" if rest.is_empty() => Ok(Output::Print(self.classes())),
            "tables" if rest.is_empty() => Ok(Output::Print(self.tables())),
            "vars" if rest.is_empty() => Ok(Output::Print(self.list_vars())),
            "table" => self.table(rest).map(Output::Print),
            "slot" => self.slot(rest).map(Output::Print),
            "let" => self.let_binding(rest),
            _ => match parse_call(line) {
                Some(call) => self.call(&call).map(|v| Output::Print(v.quoted())),
                None => eval_const(line)
                    .map(|v| Output::Print(v.quoted()))
                    .map_err(|e| e.to_string()),
            },
        }
    }

    fn classes(&self) -> String {
        let hierarchy = self.program.hierarchy();
        let lines: Vec<String> = hierarchy
            .iter()
            .map(|class| {
                let mut line = class.name().to_string();
                if let Some(parent) = class.parent_name() {
                    line.push_str(&format!(" extends {parent}"));
                }
                let slots = class.table().map_or(0, |t| t.len());
                line.push_str(&format!(" ({slots} slot{})", if slots == 1 { "" } else { "s" }));
                if !class.field_layout().is_empty() {
                    line.push_str(&format!(" fields: {}", class.field_layout().join(", ")));
                }
                line
            })
            .collect();
        if lines.is_empty() {
            "no classes loaded".to_string()
        } else {
            lines.join("\n")
        }
    }

    fn tables(&self) -> String {
        let dumps = self.program.dumps();
        if dumps.is_empty() {
            return "no classes loaded".to_string();
        }
        dumps
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("\n")
            .trim_end()
            .to_string()
    }

    fn table(&self, class: &str) -> Result<String, String> {
        let hierarchy = self.program.hierarchy();
        let id = hierarchy
            .resolve(class)
            .ok_or_else(|| format!("unknown class `{class}`"))?;
        let dump = hierarchy
            .dump(id)
            .ok_or_else(|| format!("class `{class}` has no dispatch table"))?;
        Ok(dump.to_string().trim_end().to_string())
    }

    fn slot(&self, rest: &str) -> Result<String, String> {
        let (class, signature) = rest
            .split_once(char::is_whitespace)
            .ok_or_else(|| "usage: slot Class signature".to_string())?;
        let hierarchy = self.program.hierarchy();
        let id = hierarchy
            .resolve(class)
            .ok_or_else(|| format!("unknown class `{class}`"))?;
        let method = MethodId::parse(signature)?;
        let slot = self
            .program
            .registry()
            .resolve(hierarchy, id, &method)
            .ok_or_else(|| format!("`{class}` has no method `{method}`"))?;
        Ok(format!("{class}.{method} is slot {slot}"))
    }

    fn list_vars(&self) -> String {
        let lines: Vec<String> = self
            .program
            .objects()
            .filter(|(name, _)| !self.vars.iter().any(|(v, _)| v == *name))
            .chain(self.vars.iter().map(|(n, i)| (n.as_str(), i)))
            .map(|(name, instance)| format!("{name}: {}", instance.class_name()))
            .collect();
        if lines.is_empty() {
            "no objects".to_string()
        } else {
            lines.join("\n")
        }
    }

    /// `let x = new Class(field: expr, ...)`
    fn let_binding(&mut self, rest: &str) -> Result<Output, String> {
        const USAGE: &str = "usage: let x = new Class(field: expr, ...)";
        let (name, rhs) = rest.split_once('=').ok_or(USAGE)?;
        let name = name.trim();
        if !is_identifier(name) {
            return Err(format!("invalid variable name `{name}`"));
        }
        let rhs = rhs.trim().strip_prefix("new").ok_or(USAGE)?.trim_start();
        let (class, inner) = match rhs.split_once('(') {
            Some((class, args)) => (class.trim(), args.trim_end().strip_suffix(')').ok_or(USAGE)?),
            None => (rhs, ""),
        };

        let mut inits: Vec<(&str, Value)> = Vec::new();
        for part in split_top_level(inner) {
            let (field, expr) = part
                .split_once(':')
                .ok_or_else(|| format!("expected `field: expr`, found `{part}`"))?;
            let value = eval_const(expr.trim()).map_err(|e| e.to_string())?;
            inits.push((field.trim(), value));
        }
        let instance = self
            .program
            .construct(class, inits)
            .map_err(|e| e.to_string())?;
        let class_name = instance.class_name().to_string();
        match self.vars.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = instance,
            None => self.vars.push((name.to_string(), instance)),
        }
        Ok(Output::Print(format!("{name}: {class_name}")))
    }

    fn call(&self, call: &ParsedCall<'_>) -> Result<Value, String> {
        let mut args = Vec::new();
        for arg in &call.args {
            args.push(eval_const(arg).map_err(|e| e.to_string())?);
        }
        let result = match self.vars.iter().find(|(n, _)| n == call.target) {
            Some((name, instance)) => call_instance(
                &self.program,
                name,
                instance,
                call.static_type,
                call.method,
                &args,
                None,
            ),
            None => call_object(
                &self.program,
                call.target,
                call.static_type,
                call.method,
                &args,
                None,
            ),
        };
        result.map_err(|e: LoadError| e.to_string())
    }
}

/// `x.method(args)` or `x as Class.method(args)`.
#[derive(Debug, PartialEq)]
struct ParsedCall<'a> {
    target: &'a str,
    static_type: Option<&'a str>,
    method: &'a str,
    args: Vec<&'a str>,
}

fn parse_call(line: &str) -> Option<ParsedCall<'_>> {
    let (head, tail) = line.split_once('(')?;
    let inner = tail.trim_end().strip_suffix(')')?;
    let (receiver, method) = head.trim().rsplit_once('.')?;
    let (target, static_type) = match receiver.split_once(" as ") {
        Some((t, ty)) => (t.trim(), Some(ty.trim())),
        None => (receiver.trim(), None),
    };
    let method = method.trim();
    if !is_identifier(target) || !is_identifier(method) || !static_type.map_or(true, is_identifier) {
        return None;
    }
    Some(ParsedCall {
        target,
        static_type,
        method,
        args: split_top_level(inner),
    })
}

/// Split on commas that are outside parentheses and string literals.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0u32;
    let mut in_string = false;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = text[start..].trim();
    if !last.is_empty() || !parts.is_empty() {
        parts.push(last);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_respects_strings_and_parens() {
        assert_eq!(
            split_top_level(r#"a: 1, b: "x, y", c: (1 + 2)"#),
            vec!["a: 1", r#"b: "x, y""#, "c: (1 + 2)"]
        );
        assert!(split_top_level("  ").is_empty());
    }

    #[test]
    fn parse_call_forms() {
        assert_eq!(
            parse_call("d.speak()"),
            Some(ParsedCall {
                target: "d",
                static_type: None,
                method: "speak",
                args: vec![],
            })
        );
        assert_eq!(
            parse_call("d as Base.greet(\"hi\", 1 + 2)"),
            Some(ParsedCall {
                target: "d",
                static_type: Some("Base"),
                method: "greet",
                args: vec!["\"hi\"", "1 + 2"],
            })
        );
        assert_eq!(parse_call("(1 + 2)"), None);
        assert_eq!(parse_call("1 + 2"), None);
    }

    #[test]
    fn constant_expressions_evaluate() {
        let mut session = ReplSession::empty();
        assert_eq!(
            session.execute("1 + 2 * 3"),
            Ok(Output::Print("7".to_string()))
        );
        assert_eq!(
            session.execute("\"a\" + 1"),
            Ok(Output::Print("\"a1\"".to_string()))
        );
        assert!(session.execute("1 +").is_err());
    }

    #[test]
    fn control_commands() {
        let mut session = ReplSession::empty();
        assert_eq!(session.execute("quit"), Ok(Output::Quit));
        assert_eq!(session.execute("  exit "), Ok(Output::Quit));
        assert_eq!(session.execute(""), Ok(Output::Silent));
        assert!(matches!(session.execute("help"), Ok(Output::Print(text)) if text.contains("table Class")));
        assert_eq!(
            session.execute("classes"),
            Ok(Output::Print("no classes loaded".to_string()))
        );
    }
}
