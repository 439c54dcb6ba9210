use std::fs;
use std::path::Path;

use codeimpact::cache::{CacheStore, GRAPH_FILE, INDEX_FILE, META_FILE};
use codeimpact::{Config, Engine, Error, RiskType, SymbolKind};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// A small app: a page using a hook and a component, a service, shared
/// types, a cloud function and one broken file
fn fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    write(
        root,
        "tsconfig.json",
        r#"{
  // app settings
  "compilerOptions": { "jsx": "react-jsx", "baseUrl": ".", "paths": { "@/*": ["src/*"] } },
}"#,
    );
    write(
        root,
        "src/types/user.ts",
        "export interface User {\n  id: string;\n  name: string;\n}\n",
    );
    write(
        root,
        "src/services/userService.ts",
        r#"import type { User } from "../types/user";

export async function fetchUser(id: string): Promise<User> {
  return { id, name: "" };
}
"#,
    );
    write(
        root,
        "src/hooks/useUser.ts",
        r#"import { fetchUser } from "@/services/userService";

export const useUser = (id: string) => fetchUser(id);
"#,
    );
    write(
        root,
        "src/components/UserCard.tsx",
        r#"import type { User } from "../types/user";

export const UserCard = ({ user }: { user: User }) => <div>{user.name}</div>;
"#,
    );
    write(
        root,
        "src/pages/Profile.tsx",
        r#"import { useUser } from "../hooks/useUser";
import { UserCard } from "../components/UserCard";

export default function Profile() {
  const user = useUser("me");
  return <UserCard user={user} />;
}
"#,
    );
    write(
        root,
        "functions/src/index.ts",
        r#"import { onDocumentCreated } from "firebase-functions/v2/firestore";
import { fetchUser } from "../../src/services/userService";

const handler = async (event: unknown) => fetchUser("x");

export const onUserCreate = onDocumentCreated("users/{id}", handler);
"#,
    );
    write(root, "src/broken.ts", "export const = ;\n");
    write(root, "node_modules/react/index.js", "module.exports = {};\n");

    dir
}

fn engine() -> Engine {
    Engine::new(Config::default()).unwrap()
}

#[tokio::test]
async fn test_index_contents() {
    let dir = fixture();
    let index = engine().index(dir.path(), false).await.unwrap();

    assert_eq!(index.file_count(), 6);
    assert!(index.file("src/broken.ts").is_none());
    assert!(index.files().keys().all(|p| !p.starts_with("node_modules")));
    assert!(index.is_consistent());

    let user = &index.lookup("User")[0];
    assert_eq!(user.kind, SymbolKind::Interface);
    assert!(user.definition.as_deref().unwrap().contains("name: string;"));

    assert_eq!(index.lookup("useUser")[0].kind, SymbolKind::Hook);
    assert_eq!(index.lookup("UserCard")[0].kind, SymbolKind::Component);
    assert_eq!(index.lookup("Profile")[0].kind, SymbolKind::Component);
    assert_eq!(index.file("src/pages/Profile.tsx").unwrap().exports, vec!["default"]);
    assert!(!index.lookup("handler")[0].is_exported);
}

#[tokio::test]
async fn test_trigger_end_to_end() {
    let dir = fixture();
    let index = engine().index(dir.path(), false).await.unwrap();

    let trigger = &index.lookup("onUserCreate")[0];
    assert_eq!(trigger.kind, SymbolKind::EventTrigger);
    assert!(trigger.is_exported);
    let meta = trigger.trigger_metadata.as_ref().unwrap();
    assert_eq!(meta.trigger_type, "onDocumentCreated");
    assert_eq!(meta.path.as_deref(), Some("users/{id}"));
}

#[tokio::test]
async fn test_index_is_deterministic() {
    let dir = fixture();
    let engine = engine();
    let first = engine.index(dir.path(), false).await.unwrap();
    let second = engine.index(dir.path(), false).await.unwrap();

    assert_eq!(first.files(), second.files());
    assert_eq!(first.symbols_by_name(), second.symbols_by_name());
}

#[tokio::test]
async fn test_impact_of_shared_service() {
    let dir = fixture();
    let result = engine()
        .impact(dir.path(), "./src/services/userService.ts", false)
        .await
        .unwrap();

    assert_eq!(result.target, "src/services/userService.ts");
    assert_eq!(result.downstream.direct, vec!["src/types/user.ts"]);
    assert_eq!(result.upstream.direct, vec!["functions/src/index.ts", "src/hooks/useUser.ts"]);
    assert_eq!(result.upstream.indirect, vec!["src/pages/Profile.tsx"]);
    assert!(result.cycles.is_empty());
    assert!(result.risks.is_empty());
}

#[tokio::test]
async fn test_impact_detects_cycle() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "src/a.ts", "import { b } from './b';\nexport const a = 1;\n");
    write(dir.path(), "src/b.ts", "import { c } from './c';\nexport const b = 1;\n");
    write(dir.path(), "src/c.ts", "import { a } from './a';\nexport const c = 1;\n");

    let result = engine().impact(dir.path(), "src/b.ts", true).await.unwrap();
    assert_eq!(result.cycles, vec![vec!["src/a.ts", "src/b.ts", "src/c.ts"]]);
    assert_eq!(result.risks.len(), 1);
    assert_eq!(result.risks[0].risk_type, RiskType::Circular);
}

#[tokio::test]
async fn test_impact_unknown_target() {
    let dir = fixture();
    let err = engine()
        .impact(dir.path(), "src/missing.ts", false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TargetNotIndexed { .. }));
}

#[tokio::test]
async fn test_cache_layout_and_staleness() {
    let dir = fixture();
    let engine = engine();
    engine.impact(dir.path(), "src/types/user.ts", true).await.unwrap();

    let cache_dir = dir.path().join(".codeimpact");
    for name in [INDEX_FILE, GRAPH_FILE, META_FILE] {
        assert!(cache_dir.join(name).exists(), "missing {}", name);
    }
    let meta: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(cache_dir.join(META_FILE)).unwrap()).unwrap();
    assert!(meta["index"]["sourceFingerprint"].is_string());
    assert!(meta["graph"]["builtAt"].is_string());

    let first = engine.index(dir.path(), true).await.unwrap();
    let reused = engine.index(dir.path(), true).await.unwrap();
    assert_eq!(first.built_at, reused.built_at);

    write(
        dir.path(),
        "src/types/user.ts",
        "export interface User {\n  id: string;\n}\nexport type UserId = string;\n",
    );
    let rebuilt = engine.index(dir.path(), true).await.unwrap();
    assert_ne!(first.built_at, rebuilt.built_at);
    assert_eq!(rebuilt.lookup("UserId").len(), 1);
}

#[tokio::test]
async fn test_truncated_cache_is_rebuilt() {
    let dir = fixture();
    let engine = engine();
    let first = engine.index(dir.path(), true).await.unwrap();

    let store = CacheStore::new(&dir.path().canonicalize().unwrap(), engine.config());
    fs::write(store.dir().join(INDEX_FILE), "{\"version\": 1,").unwrap();

    let rebuilt = engine.index(dir.path(), true).await.unwrap();
    assert_eq!(rebuilt.files(), first.files());
    assert!(rebuilt.is_consistent());
}

#[tokio::test]
async fn test_free_functions_use_project_config() {
    let dir = fixture();
    write(
        dir.path(),
        ".codeimpact.toml",
        "[impact]\nwidely_used_high = 2\nwidely_used_medium = 1\n",
    );

    let result = codeimpact::impact(dir.path(), "src/types/user.ts", false).await.unwrap();
    assert_eq!(result.risks[0].risk_type, RiskType::WidelyUsed);
    assert_eq!(result.risks[0].severity, codeimpact::Severity::High);

    let index = codeimpact::index(dir.path(), true).await.unwrap();
    assert_eq!(index.file_count(), 6);
}

struct EverythingIsAService;

impl codeimpact::Classify for EverythingIsAService {
    fn category_of(&self, _path: &str) -> codeimpact::Category {
        codeimpact::Category::Service
    }
}

/// Fixed graph regardless of the project contents
struct StaticEngine;

impl codeimpact::graph::engine::GraphEngine for StaticEngine {
    fn name(&self) -> &'static str {
        "static"
    }

    fn build<'a>(
        &'a self,
        _input: codeimpact::graph::engine::GraphInput<'a>,
    ) -> futures::future::BoxFuture<'a, codeimpact::Result<codeimpact::graph::RawGraph>> {
        Box::pin(async {
            codeimpact::graph::parse_engine_output(
                r#"{"graph": {"src/types/user.ts": {"adjacentTo": []}, "src/pages/Profile.tsx": {"adjacentTo": ["src/types/user.ts", "react"]}}}"#,
            )
        })
    }
}

#[tokio::test]
async fn test_injected_collaborators() {
    let dir = fixture();
    let engine = engine()
        .with_classifier(std::sync::Arc::new(EverythingIsAService))
        .with_graph_engine(Box::new(StaticEngine));

    let index = engine.index(dir.path(), false).await.unwrap();
    assert!(index
        .files()
        .values()
        .all(|f| f.category == codeimpact::Category::Service));

    let result = engine.impact(dir.path(), "src/types/user.ts", false).await.unwrap();
    assert_eq!(result.upstream.direct, vec!["src/pages/Profile.tsx"]);
    assert!(result.upstream.indirect.is_empty());
}
