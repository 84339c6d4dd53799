//! Thread-safe registry resolving tools by name.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::{Terminate, Tool, ToolError, ToolResult};
use crate::provider::ToolDefinition;

#[derive(Default)]
struct RegistryInner {
    /// Tools in registration order.
    tools: Vec<Arc<dyn Tool>>,

    /// Index from tool name to position in tools vector.
    name_index: HashMap<String, usize>,
}

/// Registry of the tools an agent may call.
///
/// Cloning is cheap and clones share the same tools, so one registry can be
/// handed to every executor.
///
/// # Example
///
/// ```rust,ignore
/// use ouds::tools::ToolRegistry;
///
/// let registry = ToolRegistry::with_terminate();
/// registry.register(Arc::new(MySearchTool))?;
///
/// // Schemas for the model
/// let tools = registry.list();
/// ```
#[derive(Clone, Default)]
pub struct ToolRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .finish()
    }
}

impl ToolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding only the built-in `terminate` tool.
    pub fn with_terminate() -> Self {
        let registry = Self::new();
        registry.inner_register(Arc::new(Terminate));
        registry
    }

    /// Tool names must be non-empty and contain only alphanumeric
    /// characters, underscores, or hyphens.
    fn validate_name(name: &str) -> ToolResult<()> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ToolError::InvalidName(name.to_string()));
        }
        Ok(())
    }

    fn inner_register(&self, tool: Arc<dyn Tool>) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let idx = inner.tools.len();
        inner.name_index.insert(tool.name().to_string(), idx);
        inner.tools.push(tool);
    }

    /// Register a tool.
    ///
    /// Returns an error if a tool with the same name already exists.
    pub fn register(&self, tool: Arc<dyn Tool>) -> ToolResult<()> {
        let name = tool.name().to_string();
        Self::validate_name(&name)?;

        if self.contains(&name) {
            return Err(ToolError::Conflict(name));
        }

        self.inner_register(tool);
        tracing::debug!("Registered tool '{}'", name);
        Ok(())
    }

    /// Find a tool by name.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .name_index
            .get(name)
            .map(|&idx| Arc::clone(&inner.tools[idx]))
    }

    /// Get a tool by name, returning an error if not found.
    pub fn get(&self, name: &str) -> ToolResult<Arc<dyn Tool>> {
        self.resolve(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))
    }

    /// Schemas of every tool, in registration order.
    pub fn list(&self) -> Vec<ToolDefinition> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.tools.iter().map(|t| t.definition()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tools
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// List all tool names, in registration order.
    pub fn tool_names(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .name_index
            .contains_key(name)
    }

    /// Remove a tool by name.
    pub fn remove(&self, name: &str) -> ToolResult<Arc<dyn Tool>> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        let idx = inner
            .name_index
            .remove(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        let tool = inner.tools.remove(idx);

        for index in inner.name_index.values_mut() {
            if *index > idx {
                *index -= 1;
            }
        }

        Ok(tool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct Echo(&'static str);

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "Echo the input"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }

        async fn execute(&self, args: Value) -> ToolResult<String> {
            Ok(args["text"].as_str().unwrap_or_default().to_string())
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(Echo("echo"))).unwrap();

        assert!(registry.contains("echo"));
        assert!(registry.resolve("echo").is_some());
        assert!(registry.resolve("missing").is_none());
        assert!(matches!(registry.get("missing"), Err(ToolError::NotFound(_))));
    }

    #[test]
    fn test_conflict_and_invalid_name() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(Echo("echo"))).unwrap();
        assert!(matches!(
            registry.register(Arc::new(Echo("echo"))),
            Err(ToolError::Conflict(_))
        ));
        assert!(matches!(
            registry.register(Arc::new(Echo("bad name"))),
            Err(ToolError::InvalidName(_))
        ));
        assert!(matches!(
            registry.register(Arc::new(Echo(""))),
            Err(ToolError::InvalidName(_))
        ));
    }

    #[test]
    fn test_list_in_registration_order() {
        let registry = ToolRegistry::with_terminate();
        registry.register(Arc::new(Echo("echo"))).unwrap();

        let names: Vec<String> = registry.list().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["terminate", "echo"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove_reindexes() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(Echo("a"))).unwrap();
        registry.register(Arc::new(Echo("b"))).unwrap();
        registry.register(Arc::new(Echo("c"))).unwrap();

        registry.remove("a").unwrap();
        assert_eq!(registry.resolve("c").unwrap().name(), "c");
        assert_eq!(registry.tool_names(), vec!["b", "c"]);
        assert!(registry.remove("a").is_err());
    }

    #[tokio::test]
    async fn test_clones_share_tools() {
        let registry = ToolRegistry::new();
        let clone = registry.clone();
        registry.register(Arc::new(Echo("echo"))).unwrap();

        let tool = clone.resolve("echo").unwrap();
        assert_eq!(tool.execute(json!({"text": "hi"})).await.unwrap(), "hi");
    }
}
