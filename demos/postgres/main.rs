use autoflow::{Config, EngineBuilder, Query, Vars, WorkflowModel};
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let config_str = include_str!("./config.toml");
    let config = Config::load_from_str(config_str).unwrap();

    let engine = EngineBuilder::new().config(config).build().unwrap();
    engine.launch().unwrap();

    let text = include_str!("./workflow.json");
    let workflow_model = WorkflowModel::from_json(text).unwrap();
    let wid = engine.create_workflow(&workflow_model).unwrap();

    let lead = json!({"name": "Grace", "email": "grace@example.com", "company": "Navy", "visits": 2});
    let eid = engine.execute_workflow(&wid, Vars::new().with("lead", lead)).unwrap();

    loop {
        let execution = engine.get_execution(&eid).unwrap();
        if execution.status.is_terminal() {
            println!("{:#?}", execution);
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    let workflows = engine.list_workflows(&Query::new().filter("owner", "demo")).unwrap();
    println!("{} workflow(s) owned by demo", workflows.count);
    println!("{:#?}", engine.stats(Some("demo")).unwrap());
    engine.shutdown();
}
