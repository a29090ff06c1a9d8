use std::path::PathBuf;

use kube::{
    Config,
    config::{InClusterError, KubeConfigOptions, Kubeconfig, KubeconfigError},
};
use snafu::{ResultExt, Snafu};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read kubeconfig from {path:?}"))]
    ReadKubeconfig {
        source: KubeconfigError,
        path: PathBuf,
    },

    #[snafu(display("failed to load kubeconfig from {path:?}"))]
    LoadKubeconfig {
        source: KubeconfigError,
        path: PathBuf,
    },

    #[snafu(display(
        "failed to infer client configuration, neither in-cluster ({in_cluster}) nor local kubeconfig worked"
    ))]
    InferConfig {
        source: KubeconfigError,
        in_cluster: InClusterError,
    },
}

/// Selects where the Kubernetes client configuration is loaded from.
#[derive(clap::Args, Clone, Debug, Default, PartialEq, Eq)]
#[command(next_help_heading = "Kubernetes Client Options")]
pub struct KubeClientOptions {
    /// Path of a kubeconfig FILE to use instead of the in-cluster
    /// configuration.
    #[arg(long, env = "KUBECONFIG", value_name = "FILE")]
    pub kubeconfig: Option<PathBuf>,
}

impl KubeClientOptions {
    /// Resolves the client configuration.
    ///
    /// An explicitly given kubeconfig always wins. Otherwise the in-cluster
    /// configuration of the service account is used, falling back to the
    /// default kubeconfig of the current user when running outside a cluster.
    pub async fn resolve(&self) -> Result<Config> {
        if let Some(path) = &self.kubeconfig {
            tracing::info!(?path, "loading client configuration from kubeconfig");
            let kubeconfig = Kubeconfig::read_from(path).context(ReadKubeconfigSnafu { path })?;

            return Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .context(LoadKubeconfigSnafu { path });
        }

        match Config::incluster() {
            Ok(config) => {
                tracing::info!("using in-cluster client configuration");
                Ok(config)
            }
            Err(in_cluster) => {
                tracing::debug!(
                    error = &in_cluster as &dyn std::error::Error,
                    "in-cluster configuration unavailable, falling back to local kubeconfig"
                );
                Config::from_kubeconfig(&KubeConfigOptions::default())
                    .await
                    .context(InferConfigSnafu { in_cluster })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
clusters:
  - name: test
    cluster:
      server: https://kubernetes.test:6443
contexts:
  - name: test
    context:
      cluster: test
      user: test
      namespace: tools
current-context: test
users:
  - name: test
    user:
      token: abc
"#;

    #[tokio::test]
    async fn loads_explicit_kubeconfig() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(KUBECONFIG.as_bytes()).unwrap();

        let options = KubeClientOptions {
            kubeconfig: Some(file.path().to_path_buf()),
        };
        let config = options.resolve().await.unwrap();

        assert_eq!(config.cluster_url.host(), Some("kubernetes.test"));
        assert_eq!(config.default_namespace, "tools");
    }

    #[tokio::test]
    async fn reports_missing_kubeconfig() {
        let options = KubeClientOptions {
            kubeconfig: Some(PathBuf::from("/does/not/exist")),
        };

        assert!(matches!(
            options.resolve().await,
            Err(Error::ReadKubeconfig { .. })
        ));
    }
}
