//! Step builders invoked by the command registry

use super::condition::{parse_condition, ComparisonOperator, Condition};
use super::context::CompilationContext;
use super::expression::{is_identifier, parse_value, BinaryOperator, Expression};
use super::registry::parse_sentence;
use super::step::{Step, StepKind};
use super::types::{infer_type, ValueType};
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::OnceLock;

const DEFAULT_CLASSIFICATION_TARGET: &str = "classification";

fn capture<'t>(caps: &Captures<'t>, index: usize) -> &'t str {
    caps.get(index).map_or("", |m| m.as_str().trim())
}

fn leaf(
    ctx: &mut CompilationContext,
    natural_language: String,
    line: &str,
    kind: StepKind,
) -> Vec<Step> {
    let id = ctx.next_step_id();
    vec![Step::new(id, natural_language, line, ctx.default_access(), kind)]
}

fn classify_regex() -> Option<&'static Regex> {
    static CLASSIFY: OnceLock<Option<Regex>> = OnceLock::new();
    CLASSIFY
        .get_or_init(|| Regex::new(r"(?i)^classify\s+(.+?)\s+with\s+(\S+)$").ok())
        .as_ref()
}

/// `set|assign VAR to EXPR`, including `set VAR to classify INPUT with MODEL`
pub fn build_set(caps: &Captures<'_>, line: &str, ctx: &mut CompilationContext) -> Vec<Step> {
    let target = capture(caps, 1);
    if !is_identifier(target) {
        ctx.diagnostic(format!("Invalid variable name: {}", target));
        return Vec::new();
    }

    let text = capture(caps, 2);
    let value = match classify_regex().and_then(|re| re.captures(text)) {
        Some(classify) => Expression::Classify {
            model: capture(&classify, 2).to_string(),
            input: Box::new(parse_value(capture(&classify, 1))),
        },
        None => parse_value(text),
    };

    ctx.record_type(target, infer_type(&value));
    let natural_language = format!("Set {} to {}", target, value);
    leaf(
        ctx,
        natural_language,
        line,
        StepKind::Set {
            target: target.to_string(),
            value,
        },
    )
}

/// `if COND then SENTENCE [else SENTENCE]`
pub fn build_if(caps: &Captures<'_>, line: &str, ctx: &mut CompilationContext) -> Vec<Step> {
    let id = ctx.next_step_id();
    let condition = parse_condition(capture(caps, 1));
    let then = parse_sentence(capture(caps, 2), ctx);
    let otherwise = match caps.get(3) {
        Some(m) => parse_sentence(m.as_str(), ctx),
        None => Vec::new(),
    };

    let natural_language = format!("If {}", condition);
    vec![Step::new(
        id,
        natural_language,
        line,
        ctx.default_access(),
        StepKind::If {
            condition,
            then,
            otherwise,
        },
    )]
}

/// `while COND do SENTENCE`
pub fn build_while(caps: &Captures<'_>, line: &str, ctx: &mut CompilationContext) -> Vec<Step> {
    let id = ctx.next_step_id();
    let condition = parse_condition(capture(caps, 1));
    let body = parse_sentence(capture(caps, 2), ctx);

    let natural_language = format!("While {}", condition);
    vec![Step::new(
        id,
        natural_language,
        line,
        ctx.default_access(),
        StepKind::While { condition, body },
    )]
}

/// `repeat|loop SENTENCE N times`
pub fn build_repeat(caps: &Captures<'_>, line: &str, ctx: &mut CompilationContext) -> Vec<Step> {
    build_count_loop(capture(caps, 1), capture(caps, 2), line, ctx)
}

/// `for N times [do] SENTENCE`
pub fn build_for(caps: &Captures<'_>, line: &str, ctx: &mut CompilationContext) -> Vec<Step> {
    build_count_loop(capture(caps, 2), capture(caps, 1), line, ctx)
}

/// A `While` over a synthetic counter: init, the parsed body, then the increment
fn build_count_loop(
    body_text: &str,
    count_text: &str,
    line: &str,
    ctx: &mut CompilationContext,
) -> Vec<Step> {
    let count: u64 = match count_text.parse() {
        Ok(count) => count,
        Err(_) => {
            ctx.diagnostic(format!("Invalid repeat count: {}", count_text));
            return Vec::new();
        }
    };

    let loop_id = ctx.next_step_id();
    // Derived from the loop's own id so nested loops never share a counter
    let counter = loop_id.counter_name();
    ctx.record_type(&counter, ValueType::Number);

    let init_id = ctx.next_step_id();
    let mut body = vec![Step::new(
        init_id,
        format!("Initialize {} to 0", counter),
        line,
        ctx.default_access(),
        StepKind::Set {
            target: counter.clone(),
            value: Expression::number(0.0),
        },
    )];

    body.extend(parse_sentence(body_text, ctx));
    let increment_id = ctx.next_step_id();
    body.push(Step::new(
        increment_id,
        format!("Increment {}", counter),
        line,
        ctx.default_access(),
        StepKind::Set {
            target: counter.clone(),
            value: Expression::binary(
                BinaryOperator::Add,
                Expression::variable(&counter),
                Expression::number(1.0),
            ),
        },
    ));

    let condition = Condition::compare(
        Expression::variable(&counter),
        ComparisonOperator::Less,
        Expression::number(count as f64),
    );
    let natural_language = format!("Repeat {} times", count);
    vec![Step::new(
        loop_id,
        natural_language,
        line,
        ctx.default_access(),
        StepKind::While { condition, body },
    )]
}

/// `wait N seconds`
pub fn build_wait(caps: &Captures<'_>, line: &str, ctx: &mut CompilationContext) -> Vec<Step> {
    let text = capture(caps, 1);
    let seconds: u32 = match text.parse() {
        Ok(seconds) => seconds,
        Err(_) => {
            ctx.diagnostic(format!("Invalid wait duration: {}", text));
            return Vec::new();
        }
    };
    leaf(
        ctx,
        format!("Wait {} seconds", seconds),
        line,
        StepKind::Wait { seconds },
    )
}

/// `return EXPR`
pub fn build_return(caps: &Captures<'_>, line: &str, ctx: &mut CompilationContext) -> Vec<Step> {
    let text = capture(caps, 1);
    if text.is_empty() {
        ctx.diagnostic("Return requires a value");
        return Vec::new();
    }
    let value = parse_value(text);
    leaf(
        ctx,
        format!("Return {}", value),
        line,
        StepKind::Return { value },
    )
}

/// `break`
pub fn build_break(_caps: &Captures<'_>, line: &str, ctx: &mut CompilationContext) -> Vec<Step> {
    leaf(ctx, "Break out of the loop".to_string(), line, StepKind::Break)
}

/// `macro NAME SENTENCE`; records a template and emits nothing
pub fn build_macro(caps: &Captures<'_>, _line: &str, ctx: &mut CompilationContext) -> Vec<Step> {
    let name = capture(caps, 1);
    if ctx.has_macro(name) {
        tracing::debug!("Redefining macro '{}'", name);
    }
    let body = parse_sentence(capture(caps, 2), ctx);
    ctx.define_macro(name, body);
    Vec::new()
}

/// `call MACRO`; expands a previously defined template with fresh ids
pub fn build_call_macro(
    caps: &Captures<'_>,
    _line: &str,
    ctx: &mut CompilationContext,
) -> Vec<Step> {
    let name = capture(caps, 1);
    match ctx.instantiate_macro(name) {
        Some(steps) => steps,
        None => {
            ctx.diagnostic(format!("Unknown macro: {}", name));
            Vec::new()
        }
    }
}

/// `call ENDPOINT into TARGET`
pub fn build_call_endpoint(
    caps: &Captures<'_>,
    line: &str,
    ctx: &mut CompilationContext,
) -> Vec<Step> {
    let endpoint = capture(caps, 1);
    let target = capture(caps, 2);
    if !is_identifier(target) {
        ctx.diagnostic(format!("Invalid variable name: {}", target));
        return Vec::new();
    }
    ctx.record_type(target, ValueType::String);
    leaf(
        ctx,
        format!("Call {} and store the response in {}", endpoint, target),
        line,
        StepKind::Call {
            target: target.to_string(),
            endpoint: endpoint.to_string(),
        },
    )
}

/// `analyze INPUT with MODEL [into|as TARGET]`
pub fn build_analyze(caps: &Captures<'_>, line: &str, ctx: &mut CompilationContext) -> Vec<Step> {
    let input = parse_value(capture(caps, 1));
    let model = capture(caps, 2);
    let target = match caps.get(3) {
        Some(m) => m.as_str(),
        None => DEFAULT_CLASSIFICATION_TARGET,
    };
    if !is_identifier(target) {
        ctx.diagnostic(format!("Invalid variable name: {}", target));
        return Vec::new();
    }
    ctx.record_type(target, ValueType::Tensor);
    leaf(
        ctx,
        format!("Classify {} with {} into {}", input, model, target),
        line,
        StepKind::AiClassify {
            model: model.to_string(),
            input,
            target: target.to_string(),
        },
    )
}

/// `render COMPONENT as TARGET`
pub fn build_render(caps: &Captures<'_>, line: &str, ctx: &mut CompilationContext) -> Vec<Step> {
    let component = capture(caps, 1);
    let target = capture(caps, 2);
    leaf(
        ctx,
        format!("Render {} as {}", component, target),
        line,
        StepKind::UiRender {
            component: component.to_string(),
            target: target.to_string(),
        },
    )
}

/// `state NAME as INITIAL`
pub fn build_state(caps: &Captures<'_>, line: &str, ctx: &mut CompilationContext) -> Vec<Step> {
    let name = capture(caps, 1);
    let initial = parse_value(capture(caps, 2));
    leaf(
        ctx,
        format!("Declare UI state {} as {}", name, initial),
        line,
        StepKind::UiState {
            name: name.to_string(),
            initial,
        },
    )
}

/// `style SELECTOR with name: value; name: value`
pub fn build_style(caps: &Captures<'_>, line: &str, ctx: &mut CompilationContext) -> Vec<Step> {
    let selector = capture(caps, 1);
    let mut properties = BTreeMap::new();
    for declaration in capture(caps, 2).split(';') {
        let declaration = declaration.trim();
        if declaration.is_empty() {
            continue;
        }
        match declaration.split_once(':') {
            Some((name, value)) if !name.trim().is_empty() && !value.trim().is_empty() => {
                properties.insert(name.trim().to_string(), value.trim().to_string());
            }
            _ => ctx.diagnostic(format!("Invalid style property: {}", declaration)),
        }
    }

    if properties.is_empty() {
        ctx.diagnostic(format!("Style for {} has no properties", selector));
        return Vec::new();
    }

    leaf(
        ctx,
        format!("Style {} with {} properties", selector, properties.len()),
        line,
        StepKind::CssStyle {
            selector: selector.to_string(),
            properties,
        },
    )
}

/// `on EVENT execute HANDLER`
pub fn build_event(caps: &Captures<'_>, line: &str, ctx: &mut CompilationContext) -> Vec<Step> {
    let event = capture(caps, 1);
    let handler = capture(caps, 2);
    leaf(
        ctx,
        format!("On {} execute {}", event, handler),
        line,
        StepKind::UiEvent {
            event: event.to_string(),
            handler: handler.to_string(),
        },
    )
}
