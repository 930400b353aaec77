//! MiniJinja template engine wrapper

use anyhow::Result;
use minijinja::{context, Environment, Error, Value};
use std::path::Path;

const INDEX_TEMPLATE: &str = include_str!("../../web/templates/index.html");

pub struct TemplateEngine {
    env: Environment<'static>,
}

impl TemplateEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.set_debug(cfg!(debug_assertions));

        // Load templates from disk when running from a checkout so edits show
        // up without a rebuild; fall back to the embedded copy otherwise.
        let template_path = "src/web/templates";
        if Path::new(template_path).exists() {
            env.set_loader(minijinja::path_loader(template_path));
        } else {
            tracing::warn!(
                "Template directory not found: {}, using embedded templates",
                template_path
            );
            env.add_template("index.html", INDEX_TEMPLATE)?;
        }

        env.add_filter("datetime", format_datetime);
        env.add_filter("percent", format_percent);

        Ok(Self { env })
    }

    /// Render a template with context
    pub fn render(&self, template_name: &str, ctx: Value) -> Result<String> {
        let template = self.env.get_template(template_name)?;
        Ok(template.render(ctx)?)
    }

    /// Add a template from string - requires owned strings for 'static lifetime
    pub fn add_template(&mut self, name: &str, content: &str) -> Result<()> {
        // MiniJinja needs 'static strings, so we leak the memory.
        // This is okay for templates as they're loaded once at startup.
        let name_static: &'static str = Box::leak(name.to_string().into_boxed_str());
        let content_static: &'static str = Box::leak(content.to_string().into_boxed_str());
        self.env.add_template(name_static, content_static)?;
        Ok(())
    }

    /// Render the main page
    pub fn render_index(&self, session_id: &str, top_k: usize, max_words: usize) -> Result<String> {
        self.render(
            "index.html",
            context! {
                title => "NextWord Bot",
                version => env!("CARGO_PKG_VERSION"),
                session_id => session_id,
                top_k => top_k,
                max_words => max_words,
            },
        )
    }
}

// Filter functions
fn format_datetime(value: &Value, _: &[Value]) -> Result<Value, Error> {
    if let Some(timestamp) = value.as_i64() {
        let dt = chrono::DateTime::from_timestamp(timestamp, 0).ok_or_else(|| {
            Error::new(minijinja::ErrorKind::InvalidOperation, "invalid timestamp")
        })?;
        Ok(Value::from(dt.format("%Y-%m-%d %H:%M:%S").to_string()))
    } else {
        Err(Error::new(
            minijinja::ErrorKind::InvalidOperation,
            "expected timestamp",
        ))
    }
}

fn format_percent(value: &Value, _: &[Value]) -> Result<Value, Error> {
    let probability = f64::try_from(value.clone()).map_err(|_| {
        Error::new(minijinja::ErrorKind::InvalidOperation, "expected number")
    })?;
    Ok(Value::from(format!("{:.1}%", probability * 100.0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_engine() -> Result<()> {
        let mut engine = TemplateEngine::new()?;
        engine.add_template("test", "Hello {{ name }}!")?;

        let result = engine.render("test", context! { name => "World" })?;
        assert_eq!(result, "Hello World!");

        Ok(())
    }

    #[test]
    fn test_percent_filter() -> Result<()> {
        let mut engine = TemplateEngine::new()?;
        engine.add_template("p", "{{ value | percent }}")?;

        let result = engine.render("p", context! { value => 0.425 })?;
        assert_eq!(result, "42.5%");

        Ok(())
    }
}
