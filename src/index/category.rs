// File category classification

use serde::{Deserialize, Serialize};

/// Closed classification tag attached to every indexed file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Page,
    Component,
    Hook,
    Service,
    Api,
    Store,
    Utility,
    Types,
    Config,
    Function,
    Test,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Page => "page",
            Category::Component => "component",
            Category::Hook => "hook",
            Category::Service => "service",
            Category::Api => "api",
            Category::Store => "store",
            Category::Utility => "utility",
            Category::Types => "types",
            Category::Config => "config",
            Category::Function => "function",
            Category::Test => "test",
            Category::Other => "other",
        }
    }
}

/// Assigns a category to a project-relative path
pub trait Classify: Send + Sync {
    fn category_of(&self, path: &str) -> Category;
}

/// Classifies by file suffix first, then by the innermost well-known directory
#[derive(Debug, Clone, Copy, Default)]
pub struct PathClassifier;

impl Classify for PathClassifier {
    fn category_of(&self, path: &str) -> Category {
        let lower = path.to_ascii_lowercase();
        let file_name = lower.rsplit('/').next().unwrap_or(&lower);

        if file_name.contains(".test.") || file_name.contains(".spec.") {
            return Category::Test;
        }
        if file_name.ends_with(".d.ts") {
            return Category::Types;
        }
        if file_name.contains(".config.") {
            return Category::Config;
        }

        let dirs: Vec<&str> = lower.split('/').collect();
        let dirs = &dirs[..dirs.len().saturating_sub(1)];

        for dir in dirs.iter().rev() {
            let category = match *dir {
                "__tests__" | "tests" | "test" | "__mocks__" => Category::Test,
                "pages" | "app" | "routes" | "views" | "screens" => Category::Page,
                "components" | "ui" | "widgets" => Category::Component,
                "hooks" => Category::Hook,
                "services" | "service" => Category::Service,
                "api" => Category::Api,
                "store" | "stores" | "state" | "redux" | "slices" => Category::Store,
                "utils" | "util" | "lib" | "helpers" => Category::Utility,
                "types" | "interfaces" | "models" => Category::Types,
                "config" | "constants" => Category::Config,
                "functions" | "triggers" => Category::Function,
                _ => continue,
            };
            return category;
        }

        Category::Other
    }
}
