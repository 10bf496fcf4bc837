//! Search parameters and their wire mapping.
//!
//! [`SearchParam`] is the caller-facing configuration. During search
//! `init()` it is lowered into the wire [`SearchParameter`] sent to every
//! region: flag polarity flips (`with_*` becomes `without_*`), the filter
//! enums map onto their wire variants, and the per-index-kind sub-parameter
//! is selected by a total match on [`IndexKind`]. Extra params that do not
//! apply to the index kind are silently discarded.

use crate::error::{ClientError, Result};
use lattice_core::IndexKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Keys of the kind-specific tuning map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtraKey {
    /// IVF probes (IvfFlat, IvfPq, BinaryIvfFlat).
    Nprobe,
    /// Intra-request query parallelism (flat and IVF families).
    ParallelOnQueries,
    /// HNSW search beam (Hnsw).
    EfSearch,
    /// PQ refinement count (IvfPq).
    RecallNum,
}

/// Where filter predicates read their operands from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FilterSource {
    #[default]
    None,
    Scalar,
    Table,
    VectorId,
}

/// Whether the filter runs before or after the vector search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FilterType {
    #[default]
    None,
    QueryPre,
    QueryPost,
}

/// Caller-facing search configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchParam {
    pub topk: u32,
    pub with_vector_data: bool,
    pub with_scalar_data: bool,
    /// Honored only when `with_scalar_data` is set.
    pub selected_keys: Vec<String>,
    pub with_table_data: bool,
    /// Keep every candidate instead of trimming to `topk`.
    pub enable_range_search: bool,
    pub filter_source: FilterSource,
    pub filter_type: FilterType,
    pub vector_ids: Vec<i64>,
    pub is_negation: bool,
    pub is_sorted: bool,
    pub use_brute_force: bool,
    /// DiskANN search beam width; ignored by other kinds.
    pub beamwidth: u32,
    /// Optional LangChain structured-query expression compiled into the
    /// coprocessor blob during search init.
    pub langchain_expr_json: String,
    pub extra_params: HashMap<ExtraKey, i32>,
}

impl Default for SearchParam {
    fn default() -> Self {
        Self {
            topk: 10,
            with_vector_data: true,
            with_scalar_data: false,
            selected_keys: Vec::new(),
            with_table_data: false,
            enable_range_search: false,
            filter_source: FilterSource::None,
            filter_type: FilterType::None,
            vector_ids: Vec::new(),
            is_negation: false,
            is_sorted: false,
            use_brute_force: false,
            beamwidth: 0,
            langchain_expr_json: String::new(),
            extra_params: HashMap::new(),
        }
    }
}

// =============================================================================
// Wire form
// =============================================================================

/// Wire filter selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WireFilter {
    #[default]
    Unset,
    ScalarFilter,
    TableFilter,
    VectorIdFilter,
}

/// Wire filter phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WireFilterType {
    #[default]
    Unset,
    QueryPre,
    QueryPost,
}

/// Per-index-kind sub-parameter carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum IndexSearchParam {
    #[default]
    None,
    Flat {
        parallel_on_queries: i32,
    },
    IvfFlat {
        nprobe: i32,
        parallel_on_queries: i32,
    },
    IvfPq {
        nprobe: i32,
        parallel_on_queries: i32,
        recall_num: i32,
    },
    Hnsw {
        efsearch: i32,
    },
    DiskAnn {
        beamwidth: u32,
    },
    BinaryFlat {
        parallel_on_queries: i32,
    },
    BinaryIvfFlat {
        nprobe: i32,
        parallel_on_queries: i32,
    },
}

/// The search parameter record sent with every search RPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SearchParameter {
    pub top_n: u32,
    pub without_vector_data: bool,
    pub without_scalar_data: bool,
    pub selected_keys: Vec<String>,
    pub without_table_data: bool,
    pub enable_range_search: bool,
    pub vector_filter: WireFilter,
    pub vector_filter_type: WireFilterType,
    pub vector_ids: Vec<i64>,
    pub is_negation: bool,
    pub is_sorted: bool,
    pub use_brute_force: bool,
    pub index_param: IndexSearchParam,
    /// Compiled filter expression; empty when no expression was given.
    pub coprocessor: Vec<u8>,
}

impl SearchParameter {
    /// Rewrites the parameter for the brute-force fallback round: the
    /// DiskANN sub-message is cleared and `use_brute_force` is set.
    pub fn for_brute_force(&self) -> Self {
        let mut param = self.clone();
        if matches!(param.index_param, IndexSearchParam::DiskAnn { .. }) {
            param.index_param = IndexSearchParam::None;
        }
        param.use_brute_force = true;
        param
    }
}

/// Lowers a [`SearchParam`] into the wire form for the given index kind.
///
/// Returns [`ClientError::UnsupportedIndexKind`] for an unset kind instead
/// of aborting; malformed descriptors fail the task, not the process.
pub fn build_search_parameter(kind: IndexKind, param: &SearchParam) -> Result<SearchParameter> {
    let extra = |key: ExtraKey| param.extra_params.get(&key).copied().unwrap_or(0);

    let index_param = match kind {
        IndexKind::None => {
            return Err(ClientError::UnsupportedIndexKind(kind.to_string()));
        }
        IndexKind::Flat => IndexSearchParam::Flat {
            parallel_on_queries: extra(ExtraKey::ParallelOnQueries),
        },
        IndexKind::IvfFlat => IndexSearchParam::IvfFlat {
            nprobe: extra(ExtraKey::Nprobe),
            parallel_on_queries: extra(ExtraKey::ParallelOnQueries),
        },
        IndexKind::IvfPq => IndexSearchParam::IvfPq {
            nprobe: extra(ExtraKey::Nprobe),
            parallel_on_queries: extra(ExtraKey::ParallelOnQueries),
            recall_num: extra(ExtraKey::RecallNum),
        },
        IndexKind::Hnsw => IndexSearchParam::Hnsw {
            efsearch: extra(ExtraKey::EfSearch),
        },
        IndexKind::DiskAnn => IndexSearchParam::DiskAnn {
            beamwidth: param.beamwidth,
        },
        IndexKind::BruteForce => IndexSearchParam::None,
        IndexKind::BinaryFlat => IndexSearchParam::BinaryFlat {
            parallel_on_queries: extra(ExtraKey::ParallelOnQueries),
        },
        IndexKind::BinaryIvfFlat => IndexSearchParam::BinaryIvfFlat {
            nprobe: extra(ExtraKey::Nprobe),
            parallel_on_queries: extra(ExtraKey::ParallelOnQueries),
        },
    };

    let selected_keys = if param.with_scalar_data {
        param.selected_keys.clone()
    } else {
        Vec::new()
    };

    Ok(SearchParameter {
        top_n: param.topk,
        without_vector_data: !param.with_vector_data,
        without_scalar_data: !param.with_scalar_data,
        selected_keys,
        without_table_data: !param.with_table_data,
        enable_range_search: param.enable_range_search,
        vector_filter: match param.filter_source {
            FilterSource::None => WireFilter::Unset,
            FilterSource::Scalar => WireFilter::ScalarFilter,
            FilterSource::Table => WireFilter::TableFilter,
            FilterSource::VectorId => WireFilter::VectorIdFilter,
        },
        vector_filter_type: match param.filter_type {
            FilterType::None => WireFilterType::Unset,
            FilterType::QueryPre => WireFilterType::QueryPre,
            FilterType::QueryPost => WireFilterType::QueryPost,
        },
        vector_ids: param.vector_ids.clone(),
        is_negation: param.is_negation,
        is_sorted: param.is_sorted,
        use_brute_force: param.use_brute_force,
        index_param,
        coprocessor: Vec::new(),
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_polarity() {
        let param = SearchParam {
            topk: 5,
            with_vector_data: false,
            with_scalar_data: true,
            selected_keys: vec!["color".to_string()],
            ..Default::default()
        };
        let wire = build_search_parameter(IndexKind::Flat, &param).unwrap();
        assert_eq!(wire.top_n, 5);
        assert!(wire.without_vector_data);
        assert!(!wire.without_scalar_data);
        assert!(wire.without_table_data);
        assert_eq!(wire.selected_keys, vec!["color".to_string()]);
    }

    #[test]
    fn test_selected_keys_dropped_without_scalar_data() {
        let param = SearchParam {
            selected_keys: vec!["color".to_string()],
            ..Default::default()
        };
        let wire = build_search_parameter(IndexKind::Flat, &param).unwrap();
        assert!(wire.selected_keys.is_empty());
    }

    #[test]
    fn test_per_kind_sub_params() {
        let mut param = SearchParam::default();
        param.extra_params.insert(ExtraKey::Nprobe, 32);
        param.extra_params.insert(ExtraKey::ParallelOnQueries, 1);
        param.extra_params.insert(ExtraKey::EfSearch, 200);
        param.extra_params.insert(ExtraKey::RecallNum, 50);
        param.beamwidth = 4;

        assert_eq!(
            build_search_parameter(IndexKind::IvfFlat, &param)
                .unwrap()
                .index_param,
            IndexSearchParam::IvfFlat {
                nprobe: 32,
                parallel_on_queries: 1
            }
        );
        assert_eq!(
            build_search_parameter(IndexKind::IvfPq, &param)
                .unwrap()
                .index_param,
            IndexSearchParam::IvfPq {
                nprobe: 32,
                parallel_on_queries: 1,
                recall_num: 50
            }
        );
        assert_eq!(
            build_search_parameter(IndexKind::Hnsw, &param)
                .unwrap()
                .index_param,
            IndexSearchParam::Hnsw { efsearch: 200 }
        );
        assert_eq!(
            build_search_parameter(IndexKind::DiskAnn, &param)
                .unwrap()
                .index_param,
            IndexSearchParam::DiskAnn { beamwidth: 4 }
        );
        // Brute force carries no sub-parameter; extras are ignored.
        assert_eq!(
            build_search_parameter(IndexKind::BruteForce, &param)
                .unwrap()
                .index_param,
            IndexSearchParam::None
        );
    }

    #[test]
    fn test_unset_kind_is_typed_error() {
        let err = build_search_parameter(IndexKind::None, &SearchParam::default()).unwrap_err();
        assert!(matches!(err, ClientError::UnsupportedIndexKind(_)));
    }

    #[test]
    fn test_filter_mapping() {
        let param = SearchParam {
            filter_source: FilterSource::VectorId,
            filter_type: FilterType::QueryPre,
            vector_ids: vec![3, 5],
            is_negation: true,
            ..Default::default()
        };
        let wire = build_search_parameter(IndexKind::Flat, &param).unwrap();
        assert_eq!(wire.vector_filter, WireFilter::VectorIdFilter);
        assert_eq!(wire.vector_filter_type, WireFilterType::QueryPre);
        assert_eq!(wire.vector_ids, vec![3, 5]);
        assert!(wire.is_negation);
    }

    #[test]
    fn test_brute_force_rewrite_clears_diskann() {
        let mut param = SearchParam::default();
        param.beamwidth = 8;
        let wire = build_search_parameter(IndexKind::DiskAnn, &param).unwrap();
        let fallback = wire.for_brute_force();
        assert_eq!(fallback.index_param, IndexSearchParam::None);
        assert!(fallback.use_brute_force);
        // The non-DiskANN fields survive the rewrite.
        assert_eq!(fallback.top_n, wire.top_n);
    }

    #[test]
    fn test_brute_force_rewrite_keeps_other_kinds() {
        let mut param = SearchParam::default();
        param.extra_params.insert(ExtraKey::EfSearch, 128);
        let wire = build_search_parameter(IndexKind::Hnsw, &param).unwrap();
        let fallback = wire.for_brute_force();
        assert_eq!(fallback.index_param, IndexSearchParam::Hnsw { efsearch: 128 });
        assert!(fallback.use_brute_force);
    }
}
