use std::collections::HashMap;

use opendal::{Operator, Scheme};
use url::Url;

use crate::Error;
use crate::ErrorKind;
use crate::Result;

/// Operator args: root
pub const OP_ARGS_ROOT: &str = "root";
/// Operator args: bucket
pub const OP_ARGS_BUCKET: &str = "bucket";
/// Operator args: azure blob container
pub const OP_ARGS_CONTAINER: &str = "container";
/// s3 and azblob endpoint
pub const OP_ARGS_ENDPOINT: &str = "endpoint";
/// s3 region
pub const OP_ARGS_REGION: &str = "region";
/// s3 access key
pub const OP_ARGS_ACCESS_KEY: &str = "access_key_id";
/// s3 access secret
pub const OP_ARGS_ACCESS_SECRET: &str = "secret_access_key";
/// azblob account name
pub const OP_ARGS_ACCOUNT_NAME: &str = "account_name";
/// azblob account key
pub const OP_ARGS_ACCOUNT_KEY: &str = "account_key";

/// Args for creating opendal operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorArgs {
    scheme: Scheme,
    args: HashMap<String, String>,
}

impl OperatorArgs {
    /// Create a builder with `Scheme`
    pub fn builder(scheme: Scheme) -> OperatorArgsBuilder {
        OperatorArgsBuilder(OperatorArgs {
            scheme,
            args: HashMap::new(),
        })
    }

    /// Creates a builder from a store location.
    ///
    /// Accepted forms: `/abs/path`, `file:///abs/path`, `s3://bucket/root`,
    /// `azblob://container/root` and `memory://`.
    pub fn builder_from_path(path: &str) -> Result<OperatorArgsBuilder> {
        if path.starts_with('/') {
            // Local file path such as: /tmp
            return Ok(OperatorArgs::builder(Scheme::Fs).with_arg(OP_ARGS_ROOT, path));
        }

        let url = Url::parse(path)?;

        let host = || {
            url.host_str()
                .map(|h| h.to_string())
                .ok_or_else(|| {
                    Error::new(
                        ErrorKind::ConfigInvalid,
                        format!("Missing bucket or container in store url: {path}"),
                    )
                })
        };

        let op = match url.scheme() {
            "file" => {
                OperatorArgs::builder(Scheme::Fs).with_arg(OP_ARGS_ROOT, url.path().to_string())
            }
            "s3" | "s3a" => OperatorArgs::builder(Scheme::S3)
                .with_arg(OP_ARGS_ROOT, url.path().to_string())
                .with_arg(OP_ARGS_BUCKET, host()?),
            "azblob" => OperatorArgs::builder(Scheme::Azblob)
                .with_arg(OP_ARGS_ROOT, url.path().to_string())
                .with_arg(OP_ARGS_CONTAINER, host()?),
            "memory" => OperatorArgs::builder(Scheme::Memory),
            _ => {
                return Err(Error::new(
                    ErrorKind::ConfigInvalid,
                    format!("Unsupported store location: {path}"),
                ));
            }
        };

        Ok(op)
    }

    /// Scheme of the store.
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Value of an arg.
    pub fn arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).map(|v| v.as_str())
    }
}

/// Operator args builder.
#[derive(Debug)]
pub struct OperatorArgsBuilder(OperatorArgs);

impl OperatorArgsBuilder {
    /// Add arg.
    pub fn with_arg(mut self, key: impl ToString, value: impl ToString) -> Self {
        self.0.args.insert(key.to_string(), value.to_string());
        self
    }

    /// Add all args
    pub fn with_args(mut self, args: impl Iterator<Item = (impl ToString, impl ToString)>) -> Self {
        self.0
            .args
            .extend(args.map(|(k, v)| (k.to_string(), v.to_string())));
        self
    }

    /// Build arg.
    pub fn build(self) -> OperatorArgs {
        self.0
    }
}

impl TryFrom<&OperatorArgs> for Operator {
    type Error = Error;

    fn try_from(args: &OperatorArgs) -> Result<Self> {
        Operator::via_map(args.scheme, args.args.clone()).map_err(|e| {
            Error::new(
                ErrorKind::ConfigInvalid,
                format!("Can't create {} operator.", args.scheme),
            )
            .set_source(e)
        })
    }
}
