//! Traffic analysis actions
//!
//! Both actions need a network and a time window, query the network's
//! traffic analysis through the retry executor and summarize the ten
//! largest rows. Data usage falls back to per-client counters when the
//! traffic analysis is empty.

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, info, warn};

use super::{ActionHandler, ActionId, ActionInput, ActionReply, ActionServices};
use crate::error::{BotError, UpstreamError};
use crate::model::Network;
use crate::resolution::format::{bold, numbered_list, Message, BULLET};
use crate::resolution::{FieldKind, ResolutionRequest};
use crate::upstream::{ApiClient, TrafficEntry};

const TRAFFIC_FIELDS: &[FieldKind] = &[FieldKind::Network, FieldKind::TimeDuration];
const SUBJECT: &str = "data usage statistics";
const TOP_N: usize = 10;

/// Device models that never report clients
const CLIENTLESS_MODELS: &[&str] = &["MC74", "MV21", "MV71"];

const BYTE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Human-readable byte count, 1024-based, at most two decimals
pub fn format_bytes(bytes: f64) -> String {
    let mut value = if bytes.is_finite() { bytes.max(0.0) } else { 0.0 };
    let mut unit = 0;
    while value >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rendered = format!("{value:.2}");
    let rendered = rendered.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", rendered, BYTE_UNITS[unit])
}

const TIME_UNITS: [(u64, &str); 5] = [
    (604_800, "week"),
    (86_400, "day"),
    (3_600, "hour"),
    (60, "minute"),
    (1, "second"),
];

/// Largest two non-zero units, e.g. "1 day and 3 hours"
pub fn humanize_seconds(secs: u64) -> String {
    let mut remaining = secs;
    let mut parts = Vec::new();
    for (size, name) in TIME_UNITS {
        if parts.len() == 2 {
            break;
        }
        let count = remaining / size;
        if count == 0 {
            continue;
        }
        remaining -= count * size;
        let plural = if count == 1 { "" } else { "s" };
        parts.push(format!("{count} {name}{plural}"));
    }
    if parts.is_empty() {
        return "0 seconds".to_string();
    }
    parts.join(" and ")
}

fn spoken_source(entry: &TrafficEntry) -> String {
    let app = entry.application.as_deref().unwrap_or("Unknown");
    match entry.destination.as_deref() {
        Some(dest) if !dest.is_empty() => format!("{app} from {dest}"),
        _ => app.to_string(),
    }
}

async fn fetch_traffic(
    services: &ActionServices,
    net: &Network,
    timespan: u64,
) -> Result<Vec<TrafficEntry>, BotError> {
    let api = services.api.as_ref();
    let net_id = net.id.as_str();
    services
        .executor
        .execute_upstream("traffic_data", || api.traffic_data(net_id, timespan))
        .await
        .map_err(|e| BotError::from(e).with_reset(FieldKind::Network))
}

pub struct TopTraffic;

#[async_trait]
impl ActionHandler for TopTraffic {
    fn id(&self) -> ActionId {
        ActionId::TopTraffic
    }

    async fn handle(
        &self,
        services: &ActionServices,
        input: &ActionInput,
    ) -> Result<ActionReply, BotError> {
        let prefix = self.id().event_prefix();
        let request = ResolutionRequest::new(&prefix, TRAFFIC_FIELDS).subject(SUBJECT);
        let fields = match services.resolve(&request, input) {
            Ok(fields) => fields,
            Err(reply) => return Ok(reply),
        };
        let net = fields.network()?;
        let duration = *fields.time_duration()?;

        let mut traffic = fetch_traffic(services, net, duration.total_seconds()).await?;
        if traffic.is_empty() {
            return Err(BotError::new(format!(
                "No top traffic data has been found in the \"{}\" network over the past {}!",
                net.name, duration
            ))
            .with_reset(FieldKind::Network));
        }

        traffic.sort_by(|a, b| b.active_time.cmp(&a.active_time));
        traffic.truncate(TOP_N);

        let lines: Vec<String> = traffic
            .iter()
            .map(|t| format!("{}: {}", t.label(), humanize_seconds(t.active_time)))
            .collect();
        let spoken: Vec<String> = traffic
            .iter()
            .map(|t| format!("{} used for {}", spoken_source(t), humanize_seconds(t.active_time)))
            .collect();

        let text = format!(
            "Your network, {}, has the following top 10 sites/apps for traffic:\n{}",
            bold(&net.name),
            numbered_list(&lines)
        );
        let speech = format!(
            "Your network, {}, has the following top 10 sites/apps for traffic: {}",
            net.name,
            spoken.join(", ")
        );
        info!(network = %net.name, rows = traffic.len(), "Top traffic served");
        Ok(ActionReply::resolved(Message::new(text, speech), &fields))
    }
}

/// Totals behind a data usage reply
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct UsageTotals {
    clients: u64,
    sent: f64,
    recv: f64,
}

impl UsageTotals {
    fn from_traffic(mut traffic: Vec<TrafficEntry>) -> Self {
        traffic.sort_by(|a, b| (b.sent + b.recv).total_cmp(&(a.sent + a.recv)));
        traffic
            .iter()
            .take(TOP_N)
            .fold(Self::default(), |acc, t| Self {
                clients: acc.clients + t.num_clients,
                sent: acc.sent + t.sent,
                recv: acc.recv + t.recv,
            })
    }

    fn from_clients(clients: &[ApiClient]) -> Self {
        clients.iter().fold(Self::default(), |acc, c| Self {
            clients: acc.clients + 1,
            sent: acc.sent + c.usage.sent,
            recv: acc.recv + c.usage.recv,
        })
    }

    fn total(&self) -> f64 {
        self.sent + self.recv
    }

    fn per_client(&self) -> f64 {
        if self.clients == 0 {
            self.total()
        } else {
            self.total() / self.clients as f64
        }
    }
}

/// Clients seen by every device of `net` that can report them
async fn fetch_client_usage(
    services: &ActionServices,
    serials: Vec<String>,
    window: u64,
) -> Result<Vec<ApiClient>, UpstreamError> {
    let api = services.api.as_ref();
    let executor = &services.executor;
    let calls = serials.iter().map(|serial| {
        let serial = serial.as_str();
        executor.execute_upstream("list_clients", move || api.list_clients(serial, window))
    });

    let mut clients = Vec::new();
    let mut first_error = None;
    let mut any_ok = false;
    for (serial, result) in serials.iter().zip(join_all(calls).await) {
        match result {
            Ok(found) => {
                any_ok = true;
                clients.extend(found);
            }
            Err(e) => {
                warn!(serial = %serial, error = %e, "Failed to list clients for device");
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) if !any_ok => Err(e),
        _ => Ok(clients),
    }
}

pub struct DataUsage;

#[async_trait]
impl ActionHandler for DataUsage {
    fn id(&self) -> ActionId {
        ActionId::DataUsage
    }

    async fn handle(
        &self,
        services: &ActionServices,
        input: &ActionInput,
    ) -> Result<ActionReply, BotError> {
        let prefix = self.id().event_prefix();
        let request = ResolutionRequest::new(&prefix, TRAFFIC_FIELDS).subject(SUBJECT);
        let fields = match services.resolve(&request, input) {
            Ok(fields) => fields,
            Err(reply) => return Ok(reply),
        };
        let net = fields.network()?;
        let duration = *fields.time_duration()?;
        let window = duration.total_seconds();

        let traffic = fetch_traffic(services, net, window).await?;
        let totals = if traffic.is_empty() {
            let serials: Vec<String> = fields
                .snapshot()
                .devices_for_network(&net.id)
                .into_iter()
                .filter(|d| !CLIENTLESS_MODELS.contains(&d.model.as_str()))
                .map(|d| d.serial.clone())
                .collect();
            debug!(network = %net.name, devices = serials.len(), "No traffic rows, falling back to client usage");
            let clients = fetch_client_usage(services, serials, window)
                .await
                .map_err(|e| BotError::from(e).with_reset(FieldKind::Network))?;
            UsageTotals::from_clients(&clients)
        } else {
            UsageTotals::from_traffic(traffic)
        };

        if totals.clients == 0 && totals.total() == 0.0 {
            return Err(BotError::new(format!(
                "No data usage has been found in the \"{}\" network over the past {}!",
                net.name, duration
            ))
            .with_reset(FieldKind::Network));
        }

        let total = format_bytes(totals.total());
        let average = format_bytes(totals.per_client());
        let sent = format_bytes(totals.sent);
        let recv = format_bytes(totals.recv);

        let text = [
            format!("{BULLET} Total data usage with {} clients over {duration}: {total}", totals.clients),
            format!("{BULLET} Average data usage over {duration}: {average} per client"),
            format!("{BULLET} Total data sent over {duration}: {sent}"),
            format!("{BULLET} Total data received over {duration}: {recv}"),
        ]
        .join("\n");
        let speech = format!(
            "The total data usage with {} clients over {duration} was {total}. \
             On average, most clients used about {average}. \
             The total data sent over the same time period was {sent} and the total data received was {recv}.",
            totals.clients
        );
        info!(network = %net.name, clients = totals.clients, "Data usage served");
        Ok(ActionReply::resolved(Message::new(text, speech), &fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::test_support::{services, services_with, ScriptedApi};
    use crate::context::ConversationContext;
    use crate::upstream::ClientUsage;
    use serde_json::json;
    use std::sync::Arc;

    fn entry(app: &str, dest: Option<&str>, active_time: u64, sent: f64, recv: f64, clients: u64) -> TrafficEntry {
        TrafficEntry {
            application: Some(app.to_string()),
            destination: dest.map(str::to_string),
            sent,
            recv,
            active_time,
            num_clients: clients,
        }
    }

    fn input(network: &str, amount: f64, unit: &str) -> ActionInput {
        ActionInput::new(
            ConversationContext::new()
                .with_current(FieldKind::Network, json!(network))
                .with_current(FieldKind::TimeDuration, json!({"amount": amount, "unit": unit})),
        )
    }

    fn scripted(traffic: Result<Vec<TrafficEntry>, UpstreamError>) -> Arc<ScriptedApi> {
        let api = ScriptedApi::default();
        *api.traffic.lock().unwrap() = Some(traffic);
        Arc::new(api)
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0.0), "0 B");
        assert_eq!(format_bytes(512.0), "512 B");
        assert_eq!(format_bytes(1536.0), "1.5 KB");
        assert_eq!(format_bytes(1024.0 * 1024.0), "1 MB");
        assert_eq!(format_bytes(1234.0 * 1024.0 * 1024.0), "1.21 GB");
    }

    #[test]
    fn test_humanize_seconds_keeps_two_largest_units() {
        assert_eq!(humanize_seconds(0), "0 seconds");
        assert_eq!(humanize_seconds(45), "45 seconds");
        assert_eq!(humanize_seconds(3661), "1 hour and 1 minute");
        assert_eq!(humanize_seconds(90_061), "1 day and 1 hour");
        assert_eq!(humanize_seconds(2 * 604_800 + 59), "2 weeks and 59 seconds");
    }

    #[tokio::test]
    async fn test_top_traffic_orders_by_active_time() {
        let api = scripted(Ok(vec![
            entry("Slack", None, 60, 0.0, 0.0, 1),
            entry("YouTube", Some("youtube.com"), 7200, 0.0, 0.0, 4),
        ]));
        let reply = TopTraffic
            .handle(&services_with(api, 10), &input("warehouse", 2.0, "h"))
            .await
            .unwrap();
        assert_eq!(
            reply.message.text,
            "Your network, <bold>Warehouse<bold>, has the following top 10 sites/apps for traffic:\n\
             1. YouTube - youtube.com: 2 hours\n2. Slack: 1 minute"
        );
        assert_eq!(
            reply.message.speech,
            "Your network, Warehouse, has the following top 10 sites/apps for traffic: \
             YouTube from youtube.com used for 2 hours, Slack used for 1 minute"
        );
        assert_eq!(
            reply.confirmed,
            vec![(FieldKind::Network, "Warehouse".to_string())]
        );
    }

    #[tokio::test]
    async fn test_top_traffic_keeps_ten_rows() {
        let rows = (1..=12).map(|i| entry(&format!("app{i}"), None, i * 60, 0.0, 0.0, 1)).collect();
        let reply = TopTraffic
            .handle(&services_with(scripted(Ok(rows)), 10), &input("warehouse", 1.0, "day"))
            .await
            .unwrap();
        assert!(reply.message.text.contains("1. app12: 12 minutes"));
        assert!(reply.message.text.contains("10. app3: 3 minutes"));
        assert!(!reply.message.text.contains("app2:"));
    }

    #[tokio::test]
    async fn test_top_traffic_empty_resets_network() {
        let err = TopTraffic
            .handle(&services_with(scripted(Ok(vec![])), 10), &input("warehouse", 2.0, "h"))
            .await
            .unwrap_err();
        assert_eq!(
            err.message,
            "No top traffic data has been found in the \"Warehouse\" network over the past 2 hours!"
        );
        assert_eq!(err.reset_fields, vec![FieldKind::Network]);
    }

    #[tokio::test]
    async fn test_upstream_failure_becomes_bot_error() {
        let api = scripted(Err(UpstreamError::Status {
            status: 400,
            message: "Timespan is too large".into(),
        }));
        let err = DataUsage
            .handle(&services_with(api, 10), &input("warehouse", 2.0, "h"))
            .await
            .unwrap_err();
        assert_eq!(err.message, "Timespan is too large");
        assert_eq!(err.reset_fields, vec![FieldKind::Network]);
    }

    #[tokio::test]
    async fn test_data_usage_sums_traffic() {
        let api = scripted(Ok(vec![
            entry("A", None, 0, 1024.0, 1024.0, 2),
            entry("B", None, 0, 0.0, 2048.0, 2),
        ]));
        let reply = DataUsage
            .handle(&services_with(api, 10), &input("warehouse", 2.0, "h"))
            .await
            .unwrap();
        assert_eq!(
            reply.message.text,
            "<o> Total data usage with 4 clients over 2 hours: 4 KB\n\
             <o> Average data usage over 2 hours: 1 KB per client\n\
             <o> Total data sent over 2 hours: 1 KB\n\
             <o> Total data received over 2 hours: 3 KB"
        );
        assert!(reply
            .message
            .speech
            .starts_with("The total data usage with 4 clients over 2 hours was 4 KB."));
    }

    #[tokio::test]
    async fn test_data_usage_falls_back_to_clients() {
        let api = ScriptedApi::default();
        *api.traffic.lock().unwrap() = Some(Ok(vec![]));
        *api.clients.lock().unwrap() = vec![ApiClient {
            description: Some("laptop".into()),
            usage: ClientUsage {
                sent: 512.0,
                recv: 512.0,
            },
        }];
        let api = Arc::new(api);

        let reply = DataUsage
            .handle(&services_with(api.clone(), 10), &input("main office", 1.0, "wk"))
            .await
            .unwrap();

        let mut serials = api.client_serials.lock().unwrap().clone();
        serials.sort();
        assert_eq!(serials, vec!["Q1", "Q2"]);
        // one client per device
        assert!(reply
            .message
            .text
            .starts_with("<o> Total data usage with 2 clients over 1 week: 2 KB"));
    }

    #[tokio::test]
    async fn test_data_usage_empty_everywhere() {
        let err = DataUsage
            .handle(&services_with(scripted(Ok(vec![])), 10), &input("warehouse", 2.0, "h"))
            .await
            .unwrap_err();
        assert_eq!(
            err.message,
            "No data usage has been found in the \"Warehouse\" network over the past 2 hours!"
        );
    }

    #[tokio::test]
    async fn test_out_of_range_duration_reprompts() {
        let reply = DataUsage
            .handle(&services(), &input("warehouse", 1.0, "yr"))
            .await
            .unwrap();
        assert_eq!(
            reply.message.text,
            "Sorry, but you can only get data usage statistics between 2 hours and 1 month."
        );
        let followup = reply.followup.unwrap();
        assert_eq!(followup.name, "datausage-repromptparams");
        assert_eq!(followup.parameters["network"], "Warehouse");
    }

}
