//! Airflow connector
//!
//! Lists DAGs through the stable REST API (`/api/v1`) with basic auth,
//! then fetches each in-scope DAG's tasks to build the task graph.

use crate::auth::AuthConfig;
use crate::concurrency::bounded_map;
use crate::config::AirflowConfig;
use crate::connector::{Connector, ExtractContext};
use crate::error::Result;
use crate::http::{HttpClient, HttpClientConfig, RequestConfig};
use crate::models::{
    Entity, Pipeline, PipelineInfo, PipelineLogicalId, PipelineTask, PipelineType,
};
use crate::pagination::{collect_pages, OffsetPaginator, StopCondition};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

/// Extracts Airflow DAGs as pipelines
#[derive(Debug)]
pub struct AirflowConnector {
    config: AirflowConfig,
    client: HttpClient,
}

impl AirflowConnector {
    pub fn new(config: AirflowConfig) -> Result<Self> {
        let base = format!("{}/api/v1", config.url.trim_end_matches('/'));
        let auth = AuthConfig::Basic {
            username: config.username.clone(),
            password: config.password.clone(),
        };

        let http = HttpClientConfig::new(base).rate_limit(config.rate_limit.clone());
        let client = HttpClient::with_auth(http, auth)?;
        Ok(Self { config, client })
    }

    async fn list_dags(&self, ctx: &ExtractContext) -> Result<Vec<Dag>> {
        let paginator = OffsetPaginator::new(
            "offset",
            "limit",
            self.config.page_size,
            StopCondition::total_count("total_entries"),
        );
        let records = collect_pages(&self.client, "/dags", RequestConfig::new(), &paginator, "dags").await?;
        Ok(ctx.parse_records(records, "dag", "dag_id"))
    }

    async fn dag_tasks(&self, dag_id: &str) -> Result<Vec<PipelineTask>> {
        let response: TaskList = self
            .client
            .get_json(&format!("/dags/{dag_id}/tasks"), RequestConfig::new())
            .await?;
        Ok(response
            .tasks
            .into_iter()
            .map(|task| PipelineTask {
                task_id: task.task_id,
                operator: task.class_ref.and_then(|class_ref| class_ref.class_name),
                downstream_task_ids: task.downstream_task_ids,
            })
            .collect())
    }

    fn in_scope(&self, dag: &Dag) -> bool {
        if dag.is_paused == Some(true) && !self.config.include_paused {
            return false;
        }
        self.config.dag_filter.matches(&dag.dag_id)
    }

    fn map_dag(&self, dag: Dag, tasks: Vec<PipelineTask>) -> Pipeline {
        let url = format!("{}/dags/{}/grid", self.config.url.trim_end_matches('/'), dag.dag_id);
        Pipeline {
            logical_id: PipelineLogicalId {
                name: dag.dag_id,
                pipeline_type: PipelineType::Airflow,
            },
            info: PipelineInfo {
                description: dag.description,
                schedule: schedule(dag.schedule_interval.as_ref())
                    .or(dag.timetable_description),
                is_paused: dag.is_paused,
                owners: dag.owners,
                tags: dag.tags.into_iter().map(|tag| tag.name).collect(),
                tasks,
                url: Some(url),
            },
        }
    }
}

#[async_trait]
impl Connector for AirflowConnector {
    fn name(&self) -> &'static str {
        "airflow"
    }

    async fn extract(&self, ctx: &ExtractContext) -> Result<Vec<Entity>> {
        let dags = self.list_dags(ctx).await?;
        let total = dags.len();
        let dags: Vec<Dag> = dags.into_iter().filter(|dag| self.in_scope(dag)).collect();
        info!(dags = total, in_scope = dags.len(), "Listed Airflow DAGs");

        let ids: Vec<String> = dags.iter().map(|dag| dag.dag_id.clone()).collect();
        let mut fan_out = bounded_map(
            ids.into_iter().map(|id| (id.clone(), id)),
            ctx.concurrency(),
            |id| async move { self.dag_tasks(&id).await },
        )
        .await;

        for (dag_id, error) in std::mem::take(&mut fan_out.failures) {
            if error.is_auth() {
                return Err(error);
            }
            ctx.report_item_error(format!("dag {dag_id}"), error);
        }

        Ok(dags
            .into_iter()
            .filter_map(|dag| {
                let tasks = fan_out.results.remove(&dag.dag_id)?;
                Some(Entity::from(self.map_dag(dag, tasks)))
            })
            .collect())
    }
}

/// Human-readable schedule from Airflow's `schedule_interval` object
fn schedule(interval: Option<&Value>) -> Option<String> {
    let interval = interval?;
    match interval.get("__type").and_then(Value::as_str) {
        Some("CronExpression") => interval.get("value").and_then(Value::as_str).map(String::from),
        Some("TimeDelta") => {
            let days = interval.get("days").and_then(Value::as_i64).unwrap_or(0);
            let seconds = interval.get("seconds").and_then(Value::as_i64).unwrap_or(0);
            Some(format!("every {days}d {seconds}s"))
        }
        _ => interval.as_str().map(String::from),
    }
}

// ============================================================================
// API types
// ============================================================================

#[derive(Debug, Deserialize)]
struct Dag {
    dag_id: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    is_paused: Option<bool>,
    #[serde(default)]
    owners: Vec<String>,
    #[serde(default)]
    tags: Vec<DagTag>,
    #[serde(default)]
    schedule_interval: Option<Value>,
    #[serde(default)]
    timetable_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DagTag {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TaskList {
    #[serde(default)]
    tasks: Vec<Task>,
}

#[derive(Debug, Deserialize)]
struct Task {
    task_id: String,
    #[serde(default)]
    class_ref: Option<ClassRef>,
    #[serde(default)]
    downstream_task_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ClassRef {
    #[serde(default)]
    class_name: Option<String>,
}
