//! YAML renderer, the default output format.

use crate::model::Document;
use crate::render::Renderer;
use anyhow::{Context, Result};

pub struct YamlRenderer;

impl Renderer for YamlRenderer {
    fn render(&self, doc: &Document) -> Result<String> {
        serde_yaml::to_string(doc).context("failed to serialize document as YAML")
    }
}
