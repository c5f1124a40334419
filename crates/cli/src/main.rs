use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use kube::{api::ListParams, Api, Client};
use rekon_resources::{handle, list, Cleanups, ManagedBy, ManagedKind, Object, Resource, SharedKind};
use serde_json::Value as Json;
use tracing::{debug, error, info};

#[derive(Parser, Debug)]
#[command(name = "rekonctl", version, about = "rekon: uniform lifecycle for Kubernetes workloads and RBAC")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Kubernetes namespace (default: current context)
    #[arg(long = "ns", global = true)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Patch an object from a YAML manifest, creating it when missing
    Apply {
        /// Manifest path
        #[arg(short = 'f', long = "file")]
        file: String,
    },
    /// Create or take over an RBAC object / service account, checking ownership first
    Ensure {
        /// Manifest path
        #[arg(short = 'f', long = "file")]
        file: String,
        /// Required value of the app.kubernetes.io/managed-by label on an existing object
        #[arg(long = "managed-by")]
        managed_by: Option<String>,
    },
    /// Print the live object
    Get { kind: String, name: String },
    /// Print the derived health state
    Status { kind: String, name: String },
    /// Delete an object (propagation from REKON_PROPAGATION_POLICY)
    Delete {
        kind: String,
        name: String,
        /// Also remove dependents the cluster does not garbage collect
        #[arg(long = "orphan-dependents", action = ArgAction::SetTrue)]
        orphan_dependents: bool,
    },
    /// List all objects of a kind with their health
    List {
        kind: String,
        /// List across every namespace
        #[arg(short = 'A', long = "all-namespaces", action = ArgAction::SetTrue)]
        all_namespaces: bool,
    },
}

fn init_tracing() {
    let env = std::env::var("REKON_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("REKON_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid REKON_METRICS_ADDR; expected host:port");
        }
    }
}

/// Expand `$body` with `$k` bound to the kind type named by `$kind`.
macro_rules! with_kind {
    ($kind:expr, $k:ident => $body:expr) => {
        match $kind.to_ascii_lowercase().as_str() {
            "deployment" | "deployments" | "deploy" => { type $k = Deployment; $body }
            "daemonset" | "daemonsets" | "ds" => { type $k = DaemonSet; $body }
            "statefulset" | "statefulsets" | "sts" => { type $k = StatefulSet; $body }
            "serviceaccount" | "serviceaccounts" | "sa" => { type $k = ServiceAccount; $body }
            "role" | "roles" => { type $k = Role; $body }
            "rolebinding" | "rolebindings" => { type $k = RoleBinding; $body }
            "clusterrole" | "clusterroles" => { type $k = ClusterRole; $body }
            "clusterrolebinding" | "clusterrolebindings" => { type $k = ClusterRoleBinding; $body }
            other => Err(anyhow!("unsupported kind: {}", other)),
        }
    };
}

/// Like `with_kind!`, restricted to kinds that support `ensure`.
macro_rules! with_shared_kind {
    ($kind:expr, $k:ident => $body:expr) => {
        match $kind.to_ascii_lowercase().as_str() {
            "serviceaccount" => { type $k = ServiceAccount; $body }
            "role" => { type $k = Role; $body }
            "rolebinding" => { type $k = RoleBinding; $body }
            "clusterrole" => { type $k = ClusterRole; $body }
            "clusterrolebinding" => { type $k = ClusterRoleBinding; $body }
            other => Err(anyhow!("ensure is not supported for kind {}", other)),
        }
    };
}

struct Manifest {
    kind: String,
    name: String,
    namespace: Option<String>,
    json: Json,
}

fn read_manifest(path: &str) -> Result<Manifest> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
    let val: serde_yaml::Value = serde_yaml::from_str(&text).context("parsing YAML")?;
    let json = serde_json::to_value(val).context("converting YAML to JSON")?;
    let kind = json.get("kind").and_then(|v| v.as_str()).ok_or_else(|| anyhow!("YAML missing kind"))?.to_string();
    let meta = json.get("metadata");
    let name = meta.and_then(|m| m.get("name")).and_then(|v| v.as_str()).ok_or_else(|| anyhow!("YAML missing metadata.name"))?.to_string();
    let namespace = meta.and_then(|m| m.get("namespace")).and_then(|v| v.as_str()).map(|s| s.to_string());
    Ok(Manifest { kind, name, namespace, json })
}

fn object<K: ManagedKind>(client: &Client, ns: &str, name: &str, body: Option<K>) -> Object<K> {
    let obj = Object::new(handle::<K>(client.clone(), ns), ns, name, body);
    if ns.is_empty() || K::CLUSTER_SCOPED {
        return obj;
    }
    let pvcs: Api<PersistentVolumeClaim> = Api::namespaced(client.clone(), ns);
    obj.with_dependents(Arc::new(pvcs))
}

fn parse_body<K: ManagedKind>(m: &Manifest) -> Result<K> {
    serde_json::from_value(m.json.clone()).with_context(|| format!("decoding {} {}", m.kind, m.name))
}

async fn ensure_one<K: SharedKind>(client: &Client, ns: &str, m: &Manifest, managed_by: Option<&str>) -> Result<Box<dyn Resource>> {
    let body = parse_body::<K>(m)?;
    let mut obj = object(client, ns, &m.name, Some(body));
    ensure_object(&mut obj, managed_by).await?;
    Ok(Box::new(obj))
}

/// Ensure a single object. No later step follows, so the registered rollback
/// is dropped rather than run, whatever the outcome.
async fn ensure_object<K: SharedKind>(obj: &mut Object<K>, managed_by: Option<&str>) -> rekon_resources::Result<()> {
    let mut cleanups = Cleanups::new();
    let res = match managed_by {
        Some(v) => obj.ensure(&mut cleanups, &[&ManagedBy::new(v)]).await,
        None => obj.ensure(&mut cleanups, &[]).await,
    };
    debug!(rollbacks = ?cleanups, ok = res.is_ok(), "ensure finished");
    res
}

fn print_one(output: Output, res: &dyn Resource) -> Result<()> {
    match output {
        Output::Human => {
            let st = res.compute_status(chrono::Utc::now());
            println!("{} • {} • {}", res.id(), st.state, st.message);
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(&res.manifest()?)?),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let client = rekon_kubehub::get_kube_client().await?;
    let default_ns = cli.namespace.clone().unwrap_or_else(|| client.default_namespace().to_string());

    let res = run(&cli, &client, &default_ns).await;
    if let Err(e) = &res {
        error!(error = ?e, "command failed");
    }
    res
}

async fn run(cli: &Cli, client: &Client, default_ns: &str) -> Result<()> {
    match &cli.command {
        Commands::Apply { file } => {
            let m = read_manifest(file)?;
            let ns = m.namespace.clone().unwrap_or_else(|| default_ns.to_string());
            info!(kind = %m.kind, name = %m.name, ns = %ns, "apply invoked");
            let res: Box<dyn Resource> = with_kind!(m.kind, K => {
                let mut obj = object::<K>(client, &ns, &m.name, Some(parse_body::<K>(&m)?));
                obj.apply().await?;
                Ok::<Box<dyn Resource>, anyhow::Error>(Box::new(obj))
            })?;
            print_one(cli.output, res.as_ref())
        }
        Commands::Ensure { file, managed_by } => {
            let m = read_manifest(file)?;
            let ns = m.namespace.clone().unwrap_or_else(|| default_ns.to_string());
            info!(kind = %m.kind, name = %m.name, ns = %ns, "ensure invoked");
            let res = with_shared_kind!(m.kind, K => ensure_one::<K>(client, &ns, &m, managed_by.as_deref()).await)?;
            print_one(cli.output, res.as_ref())
        }
        Commands::Get { kind, name } | Commands::Status { kind, name } => {
            let mut res: Box<dyn Resource> = with_kind!(kind, K => Ok::<Box<dyn Resource>, anyhow::Error>(Box::new(object::<K>(client, default_ns, name, None))))?;
            res.get().await?;
            let output = if matches!(cli.command, Commands::Get { .. }) { cli.output } else { Output::Human };
            print_one(output, res.as_ref())
        }
        Commands::Delete { kind, name, orphan_dependents } => {
            let res: Box<dyn Resource> = with_kind!(kind, K => Ok::<Box<dyn Resource>, anyhow::Error>(Box::new(object::<K>(client, default_ns, name, None))))?;
            if *orphan_dependents {
                let mut live = res.clone_resource();
                live.get().await?;
                live.delete_orphan().await?;
            }
            res.delete().await?;
            println!("deleted {}", res.id());
            Ok(())
        }
        Commands::List { kind, all_namespaces } => {
            let ns = if *all_namespaces { "" } else { default_ns };
            let items: Vec<Box<dyn Resource>> = with_kind!(kind, K => {
                let found = list::<K>(handle::<K>(client.clone(), ns), ns, ListParams::default()).await?;
                Ok::<Vec<Box<dyn Resource>>, anyhow::Error>(found.into_iter().map(|o| Box::new(o) as Box<dyn Resource>).collect())
            })?;
            match cli.output {
                Output::Human => {
                    for r in &items {
                        print_one(Output::Human, r.as_ref())?;
                    }
                }
                Output::Json => {
                    let all = items.iter().map(|r| r.manifest()).collect::<Result<Vec<_>, _>>()?;
                    println!("{}", serde_json::to_string_pretty(&all)?);
                }
            }
            Ok(())
        }
    }
}
