use crate::error::Result;
use crate::interpolate::{interpolate, Syntax};
use crate::templator::Template;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Options handed to compiled templates along with their data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderOptions {
    pub extra: Map<String, Value>,
}

pub type RenderStrategy = Arc<dyn Fn(&Template, &Value, &RenderOptions) -> Result<String> + Send + Sync>;

/// Turns a template and its data into markup.
///
/// By default compiled templates are called with `(data, options)` and uncompiled sources go
/// through the `{{ }}` interpolation pass. Pass a strategy to replace this entirely.
#[derive(Clone, Default)]
pub struct Renderer {
    strategy: Option<RenderStrategy>,
    options: RenderOptions,
}

impl core::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("Renderer")
            .field("custom", &self.strategy.is_some())
            .field("options", &self.options)
            .finish()
    }
}

impl Renderer {
    pub fn new(strategy: Option<RenderStrategy>, options: RenderOptions) -> Renderer {
        Renderer { strategy, options }
    }

    pub fn render(&self, template: &Template, data: &Value) -> Result<String> {
        if let Some(strategy) = &self.strategy {
            return strategy(template, data, &self.options);
        }
        match template {
            Template::Compiled(f) => Ok(f(data, &self.options)),
            Template::Source(source) => interpolate(source, data, Syntax::Markup),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compiled_templates_receive_data_and_options() {
        let mut options = RenderOptions::default();
        options.extra.insert("suffix".into(), json!("!"));
        let renderer = Renderer::new(None, options);
        let template = Template::compiled(|data: &Value, options: &RenderOptions| {
            format!("{}{}", data["name"].as_str().unwrap_or(""), options.extra["suffix"].as_str().unwrap_or(""))
        });
        assert_eq!(renderer.render(&template, &json!({ "name": "a" })).unwrap(), "a!");
    }

    #[test]
    fn sources_are_interpolated() {
        let renderer = Renderer::default();
        let template = Template::source("<h1>{{title}}</h1>");
        assert_eq!(
            renderer.render(&template, &json!({ "title": "x" })).unwrap(),
            "<h1>x</h1>"
        );
    }

    #[test]
    fn strategy_overrides_everything() {
        let renderer = Renderer::new(
            Some(Arc::new(|_: &Template, _: &Value, _: &RenderOptions| Ok("fixed".to_string()))),
            RenderOptions::default(),
        );
        assert_eq!(renderer.render(&Template::source("x"), &json!({})).unwrap(), "fixed");
    }
}
