//! Named cross-references (integrations, dashboard charts, hosts) cached for one run.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::client::ControlPlaneClient;
use crate::error::{Error, Result};
use crate::model::ClusterContext;

/// Chart type of event timelines; alerts on them filter events instead of metrics.
pub const EVENTS_TIMELINE: &str = "events_timeline";

// === Wire records ===

/// One entry of the integration catalog.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntegrationDefinition {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "Type", default)]
    pub kind: String,
    #[serde(rename = "Params", default)]
    pub params: Map<String, Value>,
}

impl IntegrationDefinition {
    pub fn name(&self) -> &str {
        self.params
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

#[derive(Debug, Default, Deserialize)]
struct IntegrationCatalog {
    #[serde(rename = "Definitions", default)]
    definitions: Option<Vec<IntegrationDefinition>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChartQuery {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChartDetails {
    #[serde(default)]
    pub queries: Option<Vec<ChartQuery>>,
}

/// A dashboard panel.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Chart {
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type", default)]
    pub chart_type: String,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub details: ChartDetails,
}

impl Chart {
    /// First non-empty query template, if any.
    pub fn query_template(&self) -> Option<&str> {
        self.details
            .queries
            .iter()
            .flatten()
            .map(|q| q.query.as_str())
            .find(|q| !q.is_empty())
    }

    pub fn is_timeline(&self) -> bool {
        self.chart_type == EVENTS_TIMELINE
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Dashboard {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub panels: Option<Vec<Chart>>,
}

#[derive(Debug, Default, Deserialize)]
struct DashboardCatalog {
    #[serde(default)]
    dashboards: Option<Vec<Dashboard>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeDetails {
    #[serde(default)]
    pub human_readable_identifier: String,
}

/// A monitored host as listed by the nodes endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub host_id: String,
    #[serde(rename = "HostIP", default)]
    pub host_ip: String,
    #[serde(rename = "Details", default)]
    pub details: NodeDetails,
}

impl Node {
    fn matches(&self, reference: &str) -> bool {
        self.details.human_readable_identifier == reference
            || self.host_ip == reference
            || self.host_id == reference
    }
}

/// Pick a chart among those sharing a title: one with a query template, else
/// the first timeline chart, else the first candidate.
pub fn select_chart<'a>(candidates: &[&'a Chart]) -> Option<&'a Chart> {
    candidates
        .iter()
        .find(|c| c.query_template().is_some())
        .or_else(|| candidates.iter().find(|c| c.is_timeline()))
        .or_else(|| candidates.first())
        .copied()
}

// === Cache ===

/// Per-run reference cache, keyed by cluster context and filled on first use.
#[derive(Debug, Default)]
pub struct ReferenceCache {
    integrations: HashMap<ClusterContext, Vec<IntegrationDefinition>>,
    dashboards: HashMap<ClusterContext, Vec<Dashboard>>,
    nodes: HashMap<ClusterContext, Vec<Node>>,
}

impl ReferenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The integration catalog of a cluster, fetched once per run.
    pub async fn integrations(
        &mut self,
        client: &ControlPlaneClient,
        ctx: &ClusterContext,
    ) -> Result<&[IntegrationDefinition]> {
        if !self.integrations.contains_key(ctx) {
            debug!(cluster = %ctx, "fetching integration catalog");
            let catalog: Option<IntegrationCatalog> = client.get(&ctx.path("integrations")).await?;
            let definitions = catalog.and_then(|c| c.definitions).unwrap_or_default();
            self.integrations.insert(ctx.clone(), definitions);
        }
        Ok(self
            .integrations
            .get(ctx)
            .map(Vec::as_slice)
            .unwrap_or_default())
    }

    /// Drop the cached catalog after it was mutated.
    pub fn invalidate_integrations(&mut self, ctx: &ClusterContext) {
        self.integrations.remove(ctx);
    }

    pub async fn find_integration(
        &mut self,
        client: &ControlPlaneClient,
        ctx: &ClusterContext,
        kind: &str,
        name: &str,
    ) -> Result<Option<IntegrationDefinition>> {
        Ok(self
            .integrations(client, ctx)
            .await?
            .iter()
            .find(|d| d.kind == kind && d.name() == name)
            .cloned())
    }

    /// Integration identifier by name, regardless of type.
    pub async fn integration_id(
        &mut self,
        client: &ControlPlaneClient,
        ctx: &ClusterContext,
        name: &str,
    ) -> Result<String> {
        self.integrations(client, ctx)
            .await?
            .iter()
            .find(|d| d.name() == name)
            .map(|d| d.id.clone())
            .ok_or_else(|| Error::not_found("integration", name))
    }

    /// Integration name for an identifier, `None` when the catalog does not know it.
    pub async fn integration_name(
        &mut self,
        client: &ControlPlaneClient,
        ctx: &ClusterContext,
        id: &str,
    ) -> Result<Option<String>> {
        Ok(self
            .integrations(client, ctx)
            .await?
            .iter()
            .find(|d| d.id == id)
            .map(|d| d.name().to_string()))
    }

    async fn dashboards(
        &mut self,
        client: &ControlPlaneClient,
        ctx: &ClusterContext,
    ) -> Result<&[Dashboard]> {
        if !self.dashboards.contains_key(ctx) {
            debug!(cluster = %ctx, "fetching dashboard templates");
            let catalog: Option<DashboardCatalog> =
                client.get(&ctx.path("dashboardtemplate")).await?;
            let dashboards = catalog.and_then(|c| c.dashboards).unwrap_or_default();
            self.dashboards.insert(ctx.clone(), dashboards);
        }
        Ok(self
            .dashboards
            .get(ctx)
            .map(Vec::as_slice)
            .unwrap_or_default())
    }

    /// Chart by dashboard name and chart title.
    pub async fn find_chart(
        &mut self,
        client: &ControlPlaneClient,
        ctx: &ClusterContext,
        dashboard: &str,
        title: &str,
    ) -> Result<Chart> {
        let dashboards = self.dashboards(client, ctx).await?;
        let board = dashboards
            .iter()
            .find(|d| d.name == dashboard)
            .ok_or_else(|| Error::not_found("dashboard", dashboard))?;

        let candidates: Vec<&Chart> = board
            .panels
            .iter()
            .flatten()
            .filter(|p| p.title == title)
            .collect();
        select_chart(&candidates)
            .cloned()
            .ok_or_else(|| Error::not_found("chart", format!("{}/{}", dashboard, title)))
    }

    /// Host identifiers for host names, IPs or ids.
    pub async fn host_ids(
        &mut self,
        client: &ControlPlaneClient,
        ctx: &ClusterContext,
        references: &[String],
    ) -> Result<Vec<String>> {
        if references.is_empty() {
            return Ok(Vec::new());
        }

        if !self.nodes.contains_key(ctx) {
            debug!(cluster = %ctx, "fetching node list");
            let nodes: Option<Vec<Node>> = client.get(&ctx.path("nodes")).await?;
            self.nodes.insert(ctx.clone(), nodes.unwrap_or_default());
        }
        let nodes = self.nodes.get(ctx).map(Vec::as_slice).unwrap_or_default();

        references
            .iter()
            .map(|reference| {
                nodes
                    .iter()
                    .find(|n| n.matches(reference))
                    .map(|n| n.host_id.clone())
                    .ok_or_else(|| Error::not_found("host", reference.as_str()))
            })
            .collect()
    }
}
