// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

use crate::node::{NodeTypeSet, TreeSide};

/// Configuration parameters for one graph view.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which side of associations this tree displays.
    ///
    /// Default: source.
    pub side: TreeSide,

    /// Node types the fetcher lets through. Nodes of other types are never materialized.
    ///
    /// Default: all types.
    pub allowed_types: NodeTypeSet,

    /// Node types shown initially. Can be changed at any time without refetching.
    ///
    /// Default: all types.
    pub visible_types: NodeTypeSet,

    /// Prefetch one level ahead to decide expand affordance.
    ///
    /// Default: true.
    pub prefetch_lookahead: bool,
}

impl Config {
    /// Return a default instance of `Config`.
    pub fn new() -> Self {
        Default::default()
    }

    pub fn side(mut self, side: TreeSide) -> Self {
        self.side = side;
        self
    }

    pub fn allowed_types(mut self, types: NodeTypeSet) -> Self {
        self.allowed_types = types;
        self
    }

    pub fn visible_types(mut self, types: NodeTypeSet) -> Self {
        self.visible_types = types;
        self
    }

    pub fn prefetch_lookahead(mut self, enabled: bool) -> Self {
        self.prefetch_lookahead = enabled;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            side: TreeSide::Source,
            allowed_types: NodeTypeSet::all(),
            visible_types: NodeTypeSet::all(),
            prefetch_lookahead: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::node::{NodeType, NodeTypeSet, TreeSide};

    use super::Config;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "side": "Target", "visible_types": ["ObjectAttribute"] }"#)
                .unwrap();

        assert_eq!(config.side, TreeSide::Target);
        assert_eq!(
            config.visible_types,
            NodeTypeSet::empty().with(NodeType::ObjectAttribute)
        );
        assert_eq!(config.allowed_types, NodeTypeSet::all());
        assert!(config.prefetch_lookahead);
    }

    #[test]
    fn serialize_type_sets_as_lists() {
        let config = Config::new()
            .allowed_types(NodeTypeSet::empty().with(NodeType::User))
            .prefetch_lookahead(false);

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["allowed_types"], serde_json::json!(["User"]));
        assert_eq!(json["prefetch_lookahead"], serde_json::json!(false));
    }
}
