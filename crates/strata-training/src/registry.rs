//! Layer registry: maps a layer kind identifier to a constructor that turns
//! a parameter map into an engine node.
//!
//! The table is closed. Parameters are parsed into typed records up front so
//! range errors surface before any graph is assembled. Numeric parameters
//! entered as strings (`"16"`) are accepted.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use strata_engine::{
    Activation, ActivationLayer, Dense, Dropout, Flatten, Initializer, LayerNode,
};
use thiserror::Error;

/// Largest accepted `units` for a dense layer.
pub const MAX_UNITS: usize = 1 << 16;

/// Largest accepted input width, whether given as `inputDim` or as the
/// product of `inputShape`.
pub const MAX_INPUT_DIM: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Dense,
    Dropout,
    Flatten,
    Activation,
}

impl LayerKind {
    pub const ALL: [LayerKind; 4] = [Self::Dense, Self::Dropout, Self::Flatten, Self::Activation];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dense => "dense",
            Self::Dropout => "dropout",
            Self::Flatten => "flatten",
            Self::Activation => "activation",
        }
    }

    /// Looks up a layer kind by identifier. Unknown identifiers are the
    /// caller's to handle.
    #[must_use]
    pub fn resolve(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid `{kind}` parameters: {reason}")]
pub struct InvalidParameters {
    pub kind: LayerKind,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DenseConfig {
    #[serde(deserialize_with = "lenient::count")]
    pub units: usize,
    #[serde(default)]
    pub activation: Activation,
    #[serde(default = "default_true", deserialize_with = "lenient::flag")]
    pub use_bias: bool,
    #[serde(default, deserialize_with = "lenient::shape")]
    pub input_shape: Option<Vec<usize>>,
    #[serde(default, deserialize_with = "lenient::opt_count")]
    pub input_dim: Option<usize>,
    #[serde(default)]
    pub kernel_initializer: Initializer,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DropoutConfig {
    #[serde(deserialize_with = "lenient::fraction")]
    pub rate: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActivationConfig {
    pub activation: Activation,
}

/// Typed parameters for each layer kind.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerConfig {
    Dense(DenseConfig),
    Dropout(DropoutConfig),
    Flatten,
    Activation(ActivationConfig),
}

impl LayerConfig {
    pub fn parse(kind: LayerKind, params: &Map<String, Value>) -> Result<Self, InvalidParameters> {
        let invalid = |reason: String| InvalidParameters { kind, reason };
        let value = Value::Object(params.clone());

        let config = match kind {
            LayerKind::Dense => {
                let dense: DenseConfig =
                    serde_json::from_value(value).map_err(|e| invalid(e.to_string()))?;
                if dense.units == 0 {
                    return Err(invalid("units must be >= 1".to_string()));
                }
                if dense.units > MAX_UNITS {
                    let units = dense.units;
                    return Err(invalid(format!("units must be <= {MAX_UNITS}, got {units}")));
                }
                if dense.input_shape.as_ref().is_some_and(|s| s.is_empty() || s.contains(&0)) {
                    return Err(invalid("inputShape dimensions must be >= 1".to_string()));
                }
                if let Some(dim) = dense.input_dim.filter(|&d| d == 0 || d > MAX_INPUT_DIM) {
                    let range = format!("1..={MAX_INPUT_DIM}");
                    return Err(invalid(format!("inputDim must be in {range}, got {dim}")));
                }
                if let Some(shape) = &dense.input_shape {
                    flat_width(shape).ok_or_else(|| {
                        invalid(format!("inputShape {shape:?} exceeds {MAX_INPUT_DIM} features"))
                    })?;
                }
                Self::Dense(dense)
            }
            LayerKind::Dropout => {
                let dropout: DropoutConfig =
                    serde_json::from_value(value).map_err(|e| invalid(e.to_string()))?;
                if !(0.0..1.0).contains(&dropout.rate) {
                    return Err(invalid(format!("rate must be in [0, 1), got {}", dropout.rate)));
                }
                Self::Dropout(dropout)
            }
            LayerKind::Flatten => Self::Flatten,
            LayerKind::Activation => Self::Activation(
                serde_json::from_value(value).map_err(|e| invalid(e.to_string()))?,
            ),
        };
        Ok(config)
    }

    #[must_use]
    pub fn kind(&self) -> LayerKind {
        match self {
            Self::Dense(_) => LayerKind::Dense,
            Self::Dropout(_) => LayerKind::Dropout,
            Self::Flatten => LayerKind::Flatten,
            Self::Activation(_) => LayerKind::Activation,
        }
    }

    pub fn into_node(self) -> Result<LayerNode, InvalidParameters> {
        let kind = self.kind();
        let node = match self {
            Self::Dense(cfg) => {
                let input_dim = match (cfg.input_dim, &cfg.input_shape) {
                    (Some(dim), _) => Some(dim),
                    (None, Some(shape)) => Some(flat_width(shape).ok_or_else(|| {
                        let reason = format!("inputShape {shape:?} too large");
                        InvalidParameters { kind, reason }
                    })?),
                    (None, None) => None,
                };
                Dense::new(cfg.units, cfg.activation)
                    .with_bias(cfg.use_bias)
                    .with_input_dim(input_dim)
                    .with_initializer(cfg.kernel_initializer)
                    .into()
            }
            Self::Dropout(cfg) => Dropout::new(cfg.rate)
                .map_err(|e| InvalidParameters { kind, reason: e.to_string() })?
                .into(),
            Self::Flatten => Flatten.into(),
            Self::Activation(cfg) => ActivationLayer::new(cfg.activation).into(),
        };
        Ok(node)
    }
}

/// Features per sample for `shape`, or `None` past [`MAX_INPUT_DIM`].
fn flat_width(shape: &[usize]) -> Option<usize> {
    shape
        .iter()
        .try_fold(1_usize, |acc, &d| acc.checked_mul(d))
        .filter(|&width| width <= MAX_INPUT_DIM)
}

/// Builds the engine node for `kind` from a flattened parameter map.
pub fn construct(
    kind: LayerKind,
    params: &Map<String, Value>,
) -> Result<LayerNode, InvalidParameters> {
    LayerConfig::parse(kind, params)?.into_node()
}

mod lenient {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    fn number(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn whole(value: &Value) -> Option<usize> {
        number(value).filter(|n| *n >= 0.0 && n.fract() == 0.0).map(|n| n as usize)
    }

    pub fn count<'de, D: Deserializer<'de>>(d: D) -> Result<usize, D::Error> {
        let value = Value::deserialize(d)?;
        whole(&value)
            .ok_or_else(|| D::Error::custom(format!("expected a whole number, got {value}")))
    }

    pub fn opt_count<'de, D: Deserializer<'de>>(d: D) -> Result<Option<usize>, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(None),
            value => whole(&value)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("expected a whole number, got {value}"))),
        }
    }

    pub fn fraction<'de, D: Deserializer<'de>>(d: D) -> Result<f32, D::Error> {
        let value = Value::deserialize(d)?;
        number(&value)
            .map(|n| n as f32)
            .ok_or_else(|| D::Error::custom(format!("expected a number, got {value}")))
    }

    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        match Value::deserialize(d)? {
            Value::Bool(b) => Ok(b),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(true),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(false),
            value => Err(D::Error::custom(format!("expected a boolean, got {value}"))),
        }
    }

    /// Accepts `[4, 2]`, `4`, or `"[4, 2]"` / `"4,2"`.
    pub fn shape<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<usize>>, D::Error> {
        let value = Value::deserialize(d)?;
        let dims = match &value {
            Value::Null => return Ok(None),
            Value::Array(items) => items.iter().map(whole).collect::<Option<Vec<_>>>(),
            Value::Number(_) => whole(&value).map(|n| vec![n]),
            Value::String(s) => s
                .trim_matches(|c| c == '[' || c == ']' || char::is_whitespace(c))
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|part| !part.is_empty())
                .map(|part| part.parse().ok())
                .collect::<Option<Vec<_>>>(),
            _ => None,
        };
        dims.map(Some).ok_or_else(|| D::Error::custom(format!("expected a shape, got {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_resolve_is_exact() {
        assert_eq!(LayerKind::resolve("dense"), Some(LayerKind::Dense));
        assert_eq!(LayerKind::resolve("Dense"), None);
        assert_eq!(LayerKind::resolve("conv2d"), None);
    }

    #[test]
    fn test_dense_accepts_string_numbers() {
        let raw = json!({
            "units": "16",
            "activation": "relu",
            "inputShape": "[4]",
            "useBias": "false",
        });
        let config = LayerConfig::parse(LayerKind::Dense, &params(raw)).unwrap();
        let LayerConfig::Dense(dense) = config else {
            panic!("expected dense config");
        };
        assert_eq!(dense.units, 16);
        assert_eq!(dense.activation, Activation::Relu);
        assert_eq!(dense.input_shape, Some(vec![4]));
        assert!(!dense.use_bias);
    }

    #[test]
    fn test_dense_requires_positive_units() {
        let err = construct(LayerKind::Dense, &params(json!({"units": 0}))).unwrap_err();
        assert_eq!(err.kind, LayerKind::Dense);
        assert!(construct(LayerKind::Dense, &params(json!({}))).is_err());
        assert!(construct(LayerKind::Dense, &params(json!({"units": 2.5}))).is_err());
    }

    #[test]
    fn test_dense_sizes_are_bounded() {
        let err = construct(LayerKind::Dense, &params(json!({"units": "1e12"}))).unwrap_err();
        assert!(err.reason.contains("units must be <="), "{err}");
        let at_limit = params(json!({"units": MAX_UNITS, "inputDim": MAX_INPUT_DIM}));
        assert!(construct(LayerKind::Dense, &at_limit).is_ok());

        let wide_dim = params(json!({"units": 1, "inputDim": "1e12"}));
        assert!(construct(LayerKind::Dense, &wide_dim).is_err());
        let wide_shape = params(json!({"units": 1, "inputShape": [1 << 12, 1 << 12]}));
        assert!(construct(LayerKind::Dense, &wide_shape).is_err());
        let overflow = params(json!({"units": 1, "inputShape": [u64::MAX, u64::MAX]}));
        assert!(construct(LayerKind::Dense, &overflow).is_err());
    }

    #[test]
    fn test_input_shape_flattens_to_input_dim() {
        let shaped = params(json!({"units": 2, "inputShape": [3, 4]}));
        let LayerNode::Dense(dense) = construct(LayerKind::Dense, &shaped).unwrap() else {
            panic!("expected a dense node");
        };
        assert_eq!(dense.input_dim(), Some(12));
    }

    #[test]
    fn test_dropout_rate_range() {
        assert!(construct(LayerKind::Dropout, &params(json!({"rate": 0.25}))).is_ok());
        assert!(construct(LayerKind::Dropout, &params(json!({"rate": 1.5}))).is_err());
    }

    #[test]
    fn test_activation_requires_known_identifier() {
        let softmax = params(json!({"activation": "softmax"}));
        let node = construct(LayerKind::Activation, &softmax).unwrap();
        assert_eq!(node.kind(), "activation");
        assert!(construct(LayerKind::Activation, &params(json!({"activation": "gelu"}))).is_err());
    }

    #[test]
    fn test_flatten_ignores_parameters() {
        let extra = params(json!({"dataFormat": "channelsLast"}));
        let node = construct(LayerKind::Flatten, &extra).unwrap();
        assert_eq!(node.kind(), "flatten");
    }
}
