use autoflow::{ChannelEvent, ChannelOptions, EngineBuilder, TriggerSignal, Vars, WorkflowModel};
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let engine = EngineBuilder::new().build().unwrap();
    engine.launch().unwrap();

    let text = include_str!("./workflow.json");
    let workflow_model = WorkflowModel::from_json(text).unwrap();
    engine.create_workflow(&workflow_model).unwrap();

    ChannelEvent::channel(engine.channel(), ChannelOptions::default()).on_complete(move |eid| {
        println!("Execution completed, eid: {}", eid);
    });
    ChannelEvent::channel(engine.channel(), ChannelOptions::default()).on_error(move |e| {
        println!("Execution failed: {:?}", e);
    });
    ChannelEvent::channel(engine.channel(), ChannelOptions::default()).on_log(move |log| {
        println!("[{}] {}", log.aid, log.content);
    });

    let lead = json!({"name": "Ada", "email": "ada@example.com", "company": "Analytical Engines", "visits": 5});
    let started = engine.fire(TriggerSignal::event("lead.created", Vars::new().with("lead", lead))).unwrap();

    for eid in started {
        loop {
            let execution = engine.get_execution(&eid).unwrap();
            if execution.status.is_terminal() {
                let data: serde_json::Value = execution.data.into();
                println!("Execution {} ended {}: {:#}", eid, execution.status, data);
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
    }

    println!("{:#?}", engine.get_workflow(&workflow_model.id).unwrap());
    engine.shutdown();
}
