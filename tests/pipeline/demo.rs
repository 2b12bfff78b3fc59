//! The sensor pipeline run by the binary

use fanout::app::cli::args::DemoSettings;
use fanout::app::demo;
use fanout::pubsub::api::PipelineSettings;

#[test]
fn test_demo_report_accounts_for_every_reading() {
    let settings = DemoSettings {
        readings: 12,
        sensors: 2,
        alarm_threshold: 80.0,
        summary_every: 5,
        pipeline: PipelineSettings {
            master_queue_capacity: 4,
            subscription_capacity: 2,
        },
    };

    let report = demo::run(&settings).unwrap();

    assert_eq!(report.readings_published, 24);
    assert_eq!(report.events_audited.get("reading"), Some(&24));
    let final_summary = report.summaries.last().unwrap();
    assert!(final_summary.is_final);
    assert_eq!(final_summary.readings, 24);
    assert_eq!(final_summary.alarms, report.alarms_published);
}

#[test]
fn test_demo_report_serialises_to_json() {
    let settings = DemoSettings {
        readings: 3,
        sensors: 1,
        ..DemoSettings::default()
    };

    let report = demo::run(&settings).unwrap();
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["readings_published"], 3);
    assert!(json["summaries"].is_array());
}
