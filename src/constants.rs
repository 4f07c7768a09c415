//! # Constants
//!
//! Fixed names and default tunables used throughout the operator.
//!
//! Defaults marked as tunable can be overridden through environment variables
//! at startup or through the operator ConfigMap at runtime (see [`crate::config`]).

/// Operator identity, also used as the server-side apply field manager
pub const OPERATOR_NAME: &str = "btp-manager";

/// Finalizer guarding the BtpOperator CR until deprovisioning finished
pub const DELETION_FINALIZER: &str = "custom-deletion-finalizer";

/// Label stamped on every module resource
pub const MANAGED_BY_LABEL_KEY: &str = "app.kubernetes.io/managed-by";

/// Label carrying the module chart version
pub const CHART_VERSION_LABEL_KEY: &str = "chart-version";

/// ConfigMap in the module manifests that receives the cluster id
pub const BTP_SERVICE_OPERATOR_CONFIG_MAP: &str = "sap-btp-operator-config";

/// Secret in the module manifests that receives the credentials
pub const BTP_SERVICE_OPERATOR_SECRET: &str = "sap-btp-service-operator";

/// Key in the module ConfigMap holding the cluster id
pub const CLUSTER_ID_CONFIG_KEY: &str = "CLUSTER_ID";

pub const MUTATING_WEBHOOK_NAME: &str = "sap-btp-operator-mutating-webhook-configuration";
pub const VALIDATING_WEBHOOK_NAME: &str = "sap-btp-operator-validating-webhook-configuration";

/// Service fronting the admission webhooks, used for the leaf certificate SANs
pub const WEBHOOK_SERVICE_NAME: &str = "sap-btp-operator-webhook-service";

/// Keys every credential Secret must carry with a non-empty value
pub const REQUIRED_SECRET_KEYS: [&str; 5] =
    ["clientid", "clientsecret", "sm_url", "tokenurl", "cluster_id"];

/// Credential key copied into the module ConfigMap
pub const CLUSTER_ID_SECRET_KEY: &str = "cluster_id";

// Domain resources handled by the service operator
pub const SERVICE_OPERATOR_GROUP: &str = "services.cloud.sap.com";
pub const SERVICE_OPERATOR_VERSION: &str = "v1";
pub const SERVICE_INSTANCE_KIND: &str = "ServiceInstance";
pub const SERVICE_BINDING_KIND: &str = "ServiceBinding";

// Certificate material
pub const CA_SECRET_NAME: &str = "ca-server-cert";
pub const WEBHOOK_SECRET_NAME: &str = "webhook-server-cert";
pub const CA_SECRET_DATA_PREFIX: &str = "ca";
pub const WEBHOOK_SECRET_DATA_PREFIX: &str = "tls";
pub const CERTIFICATE_POSTFIX: &str = "crt";
pub const PRIVATE_KEY_POSTFIX: &str = "key";

// Manifest roles below the resources path
pub const APPLY_DIR: &str = "apply";
pub const DELETE_DIR: &str = "delete";

/// Chart descriptor file inside the chart path
pub const CHART_DESCRIPTOR_FILE: &str = "Chart.yaml";

/// Default namespace the module is installed into (tunable)
pub const DEFAULT_CHART_NAMESPACE: &str = "kyma-system";

/// Default name of the credential Secret (tunable)
pub const DEFAULT_SECRET_NAME: &str = "sap-btp-manager";

/// Default name of the operator ConfigMap (tunable)
pub const DEFAULT_CONFIG_NAME: &str = "sap-btp-manager";

/// Default name of the service operator Deployment (tunable)
pub const DEFAULT_DEPLOYMENT_NAME: &str = "sap-btp-operator-controller-manager";

pub const DEFAULT_CHART_PATH: &str = "./module-chart/chart";
pub const DEFAULT_RESOURCES_PATH: &str = "./module-resources";

pub const DEFAULT_PROCESSING_STATE_REQUEUE_SECS: u64 = 300;
pub const DEFAULT_READY_STATE_REQUEUE_SECS: u64 = 15;
pub const DEFAULT_READY_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_READY_CHECK_INTERVAL_SECS: u64 = 2;
pub const DEFAULT_HARD_DELETE_TIMEOUT_SECS: u64 = 1200;
pub const DEFAULT_HARD_DELETE_CHECK_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_CA_CERTIFICATE_EXPIRATION_SECS: u64 = 3600;
pub const DEFAULT_WEBHOOK_CERTIFICATE_EXPIRATION_SECS: u64 = 30;

/// Certificates count as expiring this long before NotAfter (negative offset)
pub const DEFAULT_EXPIRATION_BOUNDARY_SECS: i64 = -5;

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Error backoff bounds for failed reconciliations (seconds)
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 5;
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;
