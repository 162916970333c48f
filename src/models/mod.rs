//! Shared metadata schema
//!
//! Connectors produce [`Entity`] values; the driver produces one
//! [`RunMetadata`] per run.

mod entities;
mod run;

pub use entities::{
    Chart, ChartType, Dashboard, DashboardInfo, DashboardLogicalId, DashboardPlatform,
    DashboardType, DashboardUpstream, DataPlatform, Dataset, DatasetLogicalId, DatasetSchema,
    DatasetStatistics, DatasetStructure, DatasetType, DatasetUpstream, Entity, Pipeline,
    PipelineInfo, PipelineLogicalId, PipelineTask, PipelineType, QueryLogs, SchemaField,
    SourceInfo,
};
pub use run::{ItemError, RunMetadata, RunStatus};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dataset_logical_id() {
        let dataset = Dataset::new(
            DataPlatform::Postgresql,
            Some("Prod"),
            Some("Shop"),
            Some("Public"),
            "Orders",
        );
        assert_eq!(dataset.logical_id.name, "shop.public.orders");
        assert_eq!(dataset.logical_id.account.as_deref(), Some("prod"));
        assert_eq!(dataset.structure.table, "Orders");
        assert!(dataset.entity_id().starts_with("DATASET~"));

        let same = DatasetLogicalId::new(
            DataPlatform::Postgresql,
            Some("prod"),
            Some("shop"),
            Some("public"),
            "orders",
        );
        assert_eq!(dataset.entity_id(), same.entity_id());

        let other_platform = DatasetLogicalId::new(
            DataPlatform::Mysql,
            Some("prod"),
            Some("shop"),
            Some("public"),
            "orders",
        );
        assert_ne!(dataset.entity_id(), other_platform.entity_id());
    }

    #[test]
    fn test_entity_serialization_is_tagged() {
        let entity = Entity::from(Dataset::new(
            DataPlatform::Bigquery,
            None,
            Some("p"),
            Some("d"),
            "t",
        ));
        let value = serde_json::to_value(&entity).unwrap();
        assert_eq!(value["kind"], "dataset");
        assert_eq!(value["logical_id"]["platform"], "BIGQUERY");
        assert_eq!(value["logical_id"]["name"], "p.d.t");
        assert!(value.get("schema").is_none());

        let back: Entity = serde_json::from_value(value).unwrap();
        assert_eq!(back, entity);
        assert_eq!(back.kind(), "dataset");
        assert!(back.as_dataset().is_some());
        assert!(back.as_dashboard().is_none());
    }

    #[test]
    fn test_pipeline_entity_json() {
        let entity = Entity::from(Pipeline {
            logical_id: PipelineLogicalId {
                name: "daily_load".to_string(),
                pipeline_type: PipelineType::Airflow,
            },
            info: PipelineInfo {
                schedule: Some("@daily".to_string()),
                ..Default::default()
            },
        });
        let value = serde_json::to_value(&entity).unwrap();
        assert_eq!(value["kind"], "pipeline");
        assert_eq!(value["logical_id"], json!({"name": "daily_load", "pipeline_type": "AIRFLOW"}));
        assert_eq!(value["info"]["schedule"], "@daily");
    }

    #[test]
    fn test_run_status_serde() {
        assert_eq!(serde_json::to_value(RunStatus::Degraded).unwrap(), json!("degraded"));
    }
}
