use pretty_assertions::assert_eq;
use warlock_core::{config::OrchestratorConfigBuilder, test_util::TempWorkspace, FileType, Orchestrator};

#[test]
fn cold_start_transpiles_and_rewrites_a_small_project() {
    let workspace = TempWorkspace::new()
        .file(
            "src/app/users/utils.ts",
            "export function greet(name: string): string { return `hello ${name}`; }",
        )
        .file(
            "src/app/users/main.ts",
            "import { greet } from \"./utils\";\nexport const message = greet(\"world\");",
        )
        .file("src/config/database.ts", "export const url: string = \"sqlite://dev.db\";")
        .build();

    let config = OrchestratorConfigBuilder::new().batch_size(50).build();
    let orchestrator = Orchestrator::start(&workspace.root(), config).expect("cold start succeeds");

    let main = orchestrator.table.get("src/app/users/main.ts").expect("main.ts is tracked");
    assert_eq!(main.file_type, FileType::Main);
    assert!(main.imports_rewritten, "main.ts should have its import rewritten");
    assert!(main.transpiled.as_deref().unwrap_or_default().contains("__import"));

    let config_file = orchestrator.table.get("src/config/database.ts").expect("config file is tracked");
    assert_eq!(config_file.file_type, FileType::Config);

    assert!(orchestrator.cache_store.manifest_path().exists());
}

#[test]
fn warm_start_reuses_unchanged_artifacts() {
    let workspace = TempWorkspace::new()
        .file("src/app/users/main.ts", "export const value = 1;")
        .build();

    let config = OrchestratorConfigBuilder::new().batch_size(50).build();
    {
        Orchestrator::start(&workspace.root(), config.clone()).expect("first start succeeds");
    }

    let second = Orchestrator::start(&workspace.root(), config).expect("warm start succeeds");
    let record = second.table.get("src/app/users/main.ts").expect("main.ts is still tracked");
    assert_eq!(record.version, 1, "unchanged file should not be reprocessed on warm start");
}
