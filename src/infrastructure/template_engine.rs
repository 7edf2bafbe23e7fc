//! Template composition with minijinja.
//!
//! Every render builds a fresh [`minijinja::Environment`] acting as the
//! template registry for that request: the shared partials, each page under
//! its file stem, the selected page again under [`PAGE_TEMPLATE`], and the
//! base layout under [`BASE_TEMPLATE`]. Nothing is shared between renders
//! except the partial sources.

use anyhow::Context;
use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use minijinja::value::{Rest, Value, ValueKind};
use minijinja::{AutoEscape, Environment, ErrorKind, HtmlEscape, UndefinedBehavior};
use std::collections::BTreeMap;
use std::path::Path;

use crate::domain::calendar::local_midnight;
use crate::domain::dashboard::DashboardDefinition;
use crate::domain::render::RenderContext;

/// Name the base layout is registered and executed under
pub const BASE_TEMPLATE: &str = "base";

/// Alias of the selected page, so the layout can include it by a fixed name
pub const PAGE_TEMPLATE: &str = "page";

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("failed to parse template {name}: {source}")]
    Parse {
        name: String,
        #[source]
        source: minijinja::Error,
    },
    #[error("failed to execute template: {0}")]
    Render(#[source] minijinja::Error),
    #[error("page {0} does not exist")]
    MissingPage(usize),
}

#[derive(Debug, Clone, Default)]
pub struct TemplateEngine {
    partials: Vec<(String, String)>,
}

impl TemplateEngine {
    pub fn new(partials: Vec<(String, String)>) -> Self {
        Self { partials }
    }

    /// Load every file of `dir` as a shared partial named by its file name.
    /// A missing directory yields an engine without partials.
    pub fn from_dir(dir: &Path) -> anyhow::Result<Self> {
        if !dir.is_dir() {
            tracing::warn!(dir = %dir.display(), "templates directory not found, no partials loaded");
            return Ok(Self::default());
        }

        let mut partials = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read templates directory {}", dir.display()))?
        {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let source = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read template {}", path.display()))?;
            partials.push((name.to_string(), source));
        }
        partials.sort();

        tracing::debug!(count = partials.len(), "loaded shared templates");
        Ok(Self { partials })
    }

    pub fn partial_names(&self) -> impl Iterator<Item = &str> {
        self.partials.iter().map(|(name, _)| name.as_str())
    }

    /// Compose the dashboard's templates and execute the base layout
    pub fn render(
        &self,
        dashboard: &DashboardDefinition,
        context: &RenderContext,
        now: DateTime<Tz>,
    ) -> Result<String, TemplateError> {
        let env = self.registry(dashboard, context.page_index, now)?;
        let template = env.get_template(BASE_TEMPLATE).map_err(TemplateError::Render)?;
        template.render(context).map_err(TemplateError::Render)
    }

    fn registry<'a>(
        &'a self,
        dashboard: &'a DashboardDefinition,
        page_index: usize,
        now: DateTime<Tz>,
    ) -> Result<Environment<'a>, TemplateError> {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::Html);
        // missing entities and services render empty instead of failing
        env.set_undefined_behavior(UndefinedBehavior::Chainable);
        register_helpers(&mut env, now);

        let parse_error = |name: &str| {
            let name = name.to_string();
            move |source: minijinja::Error| TemplateError::Parse { name, source }
        };

        for (name, source) in &self.partials {
            env.add_template(name, source).map_err(parse_error(name))?;
        }
        for page in &dashboard.pages {
            env.add_template(&page.name, &page.body)
                .map_err(parse_error(&page.name))?;
        }

        let current = dashboard
            .page(page_index)
            .ok_or(TemplateError::MissingPage(page_index))?;
        env.add_template(PAGE_TEMPLATE, &current.body)
            .map_err(parse_error(&current.name))?;
        env.add_template(BASE_TEMPLATE, &dashboard.layout.body)
            .map_err(parse_error(BASE_TEMPLATE))?;

        tracing::debug!(
            partials = self.partials.len(),
            pages = dashboard.pages.len(),
            page = %current.name,
            "composed templates"
        );

        Ok(env)
    }
}

fn register_helpers(env: &mut Environment<'_>, now: DateTime<Tz>) {
    let tz = now.timezone();

    env.add_function("seq", seq);
    env.add_function("has_index", has_index);
    env.add_function("dict", dict);
    env.add_function("reverse", reverse);
    env.add_function("nl2br", nl2br);
    env.add_filter("nl2br", nl2br);

    env.add_function("parse_time", move |value: String| {
        parse_time(&value, &tz).map(|t| t.to_rfc3339())
    });
    env.add_function("format_time_to_hour", move |value: String| {
        parse_time(&value, &tz).map(|t| t.format("%H:%M").to_string())
    });
    env.add_function("format_time_to_day", move |value: String| {
        parse_time(&value, &tz).map(|t| format_day(&t))
    });
    env.add_function("format_time_to_rel_day", move |value: String| {
        parse_time(&value, &tz).map(|t| relative_day(&t, &now))
    });

    for name in [
        "safe_html",
        "safe_css",
        "safe_html_attr",
        "safe_url",
        "safe_js",
        "safe_js_str",
        "safe_srcset",
    ] {
        env.add_function(name, safe);
        env.add_filter(name, safe);
    }
}

fn invalid(detail: impl Into<String>) -> minijinja::Error {
    minijinja::Error::new(ErrorKind::InvalidOperation, detail.into())
}

fn seq(n: u32) -> Vec<u32> {
    (0..n).collect()
}

fn has_index(value: Value, key: Value) -> Result<bool, minijinja::Error> {
    match value.kind() {
        ValueKind::Undefined | ValueKind::None => Ok(false),
        ValueKind::Seq => {
            let index = key
                .as_i64()
                .ok_or_else(|| invalid("sequence index must be an integer"))?;
            let len = value.len().unwrap_or(0) as i64;
            Ok(index >= 0 && index < len)
        }
        ValueKind::Map => Ok(!value.get_item(&key)?.is_undefined()),
        kind => Err(invalid(format!("can't check index of {kind}"))),
    }
}

/// `dict("a", 1, "b", 2)`: ad hoc maps for passing values to includes
fn dict(args: Rest<Value>) -> Result<Value, minijinja::Error> {
    if args.len() % 2 != 0 {
        return Err(invalid("invalid number of arguments, must be even"));
    }
    let mut map = BTreeMap::new();
    for pair in args.chunks(2) {
        let key = pair[0]
            .as_str()
            .ok_or_else(|| invalid("map keys must be strings"))?;
        map.insert(key.to_string(), pair[1].clone());
    }
    Ok(Value::from(map))
}

fn reverse(value: Value) -> Result<Value, minijinja::Error> {
    if value.kind() != ValueKind::Seq {
        return Err(invalid(format!("can't reverse {}", value.kind())));
    }
    let mut items: Vec<Value> = value.try_iter()?.collect();
    items.reverse();
    Ok(Value::from(items))
}

/// Newlines to `<br>`; untrusted input is escaped first
fn nl2br(value: Value) -> Value {
    let text = match value.as_str() {
        Some(s) => s.to_string(),
        None if value.is_undefined() || value.is_none() => String::new(),
        None => value.to_string(),
    };
    let escaped = if value.is_safe() {
        text
    } else {
        HtmlEscape(&text).to_string()
    };
    Value::from_safe_string(escaped.replace("\r\n", "\n").replace('\n', "<br>"))
}

/// Marks trusted markup so auto-escaping leaves it alone
fn safe(value: String) -> Value {
    Value::from_safe_string(value)
}

/// Accepts RFC 3339 instants and plain `YYYY-MM-DD` dates
fn parse_time(value: &str, tz: &Tz) -> Result<DateTime<Tz>, minijinja::Error> {
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Ok(t.with_timezone(tz));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|date| local_midnight(date, tz).with_timezone(tz))
        .map_err(|_| invalid(format!("invalid time: {value:?}")))
}

fn format_day(t: &DateTime<Tz>) -> String {
    t.format("%a %e %b").to_string()
}

fn relative_day(t: &DateTime<Tz>, now: &DateTime<Tz>) -> String {
    let date = t.date_naive();
    let today = now.date_naive();
    if date == today {
        "Today".to_string()
    } else if today.pred_opt() == Some(date) {
        "Yesterday".to_string()
    } else if today.succ_opt() == Some(date) {
        "Tomorrow".to_string()
    } else {
        format_day(t)
    }
}
