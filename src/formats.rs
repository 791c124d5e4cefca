//! Registry of the wire formats a dump can be written in.

use std::sync::Arc;

use bson_format::BsonFormat;
use csv_format::CsvFormat;
use migrator_core::Format;
use xml_format::XmlFormat;

/// Formats by name, in registration order.
#[derive(Clone)]
pub struct FormatRegistry {
    formats: Vec<Arc<dyn Format>>,
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl FormatRegistry {
    pub fn empty() -> Self {
        Self {
            formats: Vec::new(),
        }
    }

    /// Registry holding the csv, bson and xml formats.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(CsvFormat));
        registry.register(Arc::new(BsonFormat));
        registry.register(Arc::new(XmlFormat));
        registry
    }

    /// Register a format, replacing any format of the same name.
    pub fn register(&mut self, format: Arc<dyn Format>) {
        self.formats.retain(|f| f.name() != format.name());
        self.formats.push(format);
    }

    pub fn get(&self, name: &str) -> anyhow::Result<Arc<dyn Format>> {
        self.formats
            .iter()
            .find(|f| f.name().eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown format '{}' (available: {})",
                    name,
                    self.names().join(", ")
                )
            })
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.formats.iter().map(|f| f.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_formats() {
        let registry = FormatRegistry::standard();
        assert_eq!(registry.names(), vec!["csv", "bson", "xml"]);
        assert_eq!(registry.get("BSON").unwrap().extension(), "bson");
        let err = registry.get("parquet").err().unwrap();
        assert_eq!(
            err.to_string(),
            "Unknown format 'parquet' (available: csv, bson, xml)"
        );
    }
}
