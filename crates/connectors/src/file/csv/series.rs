use crate::error::ConnectorError;
use model::records::batch::METRIC_NAME_LABEL;
use pest::{Parser, iterators::Pair};
use pest_derive::Parser;
use std::collections::BTreeMap;

#[derive(Parser)]
#[grammar = "grammar/selector.pest"]
struct SelectorParser;

/// Parses a series selector such as `http_requests{code="200",job="api"}`
/// into its label set. The metric name, if any, lands under `__name__`.
pub fn parse_selector(raw: &str) -> Result<BTreeMap<String, String>, ConnectorError> {
    let invalid = |reason: String| ConnectorError::InvalidSeries {
        selector: raw.to_string(),
        reason,
    };

    let selector = SelectorParser::parse(Rule::selector, raw.trim())
        .map_err(|err| invalid(err.variant.to_string()))?
        .next()
        .ok_or_else(|| invalid("empty selector".into()))?;

    let mut labels = BTreeMap::new();
    for pair in selector.into_inner() {
        match pair.as_rule() {
            Rule::metric_name => {
                labels.insert(METRIC_NAME_LABEL.to_string(), pair.as_str().to_string());
            }
            Rule::label_set => {
                for label in pair.into_inner() {
                    let (key, value) = label_pair(label);
                    if labels.insert(key.clone(), value).is_some() {
                        return Err(invalid(format!("duplicate label '{key}'")));
                    }
                }
            }
            _ => {}
        }
    }

    if labels.is_empty() {
        return Err(invalid("empty selector".into()));
    }
    Ok(labels)
}

fn label_pair(label: Pair<'_, Rule>) -> (String, String) {
    let mut key = String::new();
    let mut value = String::new();
    for part in label.into_inner() {
        match part.as_rule() {
            Rule::label_name => key = part.as_str().to_string(),
            Rule::label_value => value = unquote(part.as_str()),
            _ => {}
        }
    }
    (key, value)
}

/// Strips the quotes and resolves `\\`, `\"` and `\n`.
fn unquote(quoted: &str) -> String {
    let body = quoted
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(quoted);

    let mut value = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            value.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => value.push('\n'),
            Some(other) => value.push(other),
            None => value.push(c),
        }
    }
    value
}
