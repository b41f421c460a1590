//Copyright (C) 2017-2018 Baidu, Inc. All Rights Reserved.
//
//Redistribution and use in source and binary forms, with or without
//modification, are permitted provided that the following conditions
//are met:
//
// * Redistributions of source code must retain the above copyright
//   notice, this list of conditions and the following disclaimer.
//
// * Redistributions in binary form must reproduce the above copyright
//   notice, this list of conditions and the following disclaimer in
//   the documentation and/or other materials provided with the
//   distribution.
//
// * Neither the name of Baidu, Inc., nor the names of its
//   contributors may be used to endorse or promote products derived
//   from this software without specific prior written permission.
//
//THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS
//"AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT
//LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR
//A PARTICULAR PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT
//OWNER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
//SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT
//LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; Loss OF USE,
//DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY
//THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT
//(INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE
//OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! Learning to rank with LambdaMART.
//!
//! Documents arrive in an [`InputDataContainer`](data_container/struct.InputDataContainer.html)
//! grouped by query, with their relevance grades as outputs. [`LambdaMART`](gradient_boost/struct.LambdaMART.html)
//! boosts least-squares [`RegressionTree`](regression_tree/struct.RegressionTree.html)s fitted to the
//! pairwise lambda gradients of RankNet, LambdaRank or LambdaMART and scores new
//! documents with the weighted ensemble.
//!
//! # Example
//! ```
//! use ltr::config::Config;
//! use ltr::data_container::{DataContainer, FeatureSet, InputDataContainer};
//! use ltr::gradient_boost::LambdaMART;
//!
//! let docs = vec![
//!     FeatureSet::new_training_data(1, vec![1.0, 0.0], 2),
//!     FeatureSet::new_training_data(1, vec![0.0, 1.0], 0),
//!     FeatureSet::new_training_data(2, vec![0.7, 0.2], 1),
//!     FeatureSet::new_training_data(2, vec![0.1, 0.5], 0),
//! ];
//! let train = InputDataContainer::from_feature_sets(2, &docs).unwrap();
//!
//! let mut cfg = Config::new();
//! cfg.set_feature_size(2);
//! cfg.set_iterations(5);
//! let mut model = LambdaMART::new(&cfg);
//! model.fit(&train).unwrap();
//!
//! let scores = model.predict(&train).unwrap();
//! assert!(scores[0] > scores[1]);
//! assert!(scores[2] > scores[3]);
//! ```

#![allow(clippy::float_cmp)]

pub mod binary_tree;
pub mod config;
pub mod data_container;
pub mod errors;
pub mod fitness;
pub mod gradient_boost;
pub mod lambda;
pub mod learning_rate;
pub mod model;
pub mod ndcg;
pub mod regression_tree;

#[cfg(test)]
mod tests {
    use crate::config::{algorithm2string, string2algorithm, Algorithm, Config};
    use crate::data_container::{
        DataContainer, FeatureSet, InputDataContainer, ReferenceDataContainer, ValueType,
    };
    use crate::errors::LtrError;
    use crate::fitness::{ranknet_cost, ranknet_gradient, sigmoid};
    use crate::gradient_boost::{Ensemble, LambdaMART};
    use crate::lambda::LambdaGradientComputer;
    use crate::learning_rate::{
        create_learning_rate_function, CompositeLearningRate, ConstantLearningRate,
        LearningRate, LearningRateFunction, LinearLearningRate,
    };
    use crate::model::Scorer;
    use crate::ndcg::{NdcgEvaluator, NdcgMetric};
    use crate::regression_tree::RegressionTree;
    use approx::assert_abs_diff_eq;

    /// The 8 document, 3 feature example set; the relevance is the output.
    fn example_data() -> InputDataContainer {
        let rows: [([ValueType; 3], ValueType); 8] = [
            ([1.0, 1.0, 8.0], 1.0),
            ([2.0, 3.0, 7.0], 2.0),
            ([3.0, 4.0, 4.0], 2.0),
            ([4.0, 2.0, 3.0], 1.0),
            ([5.0, 6.0, 1.0], 3.0),
            ([6.0, 8.0, 2.0], 4.0),
            ([7.0, 5.0, 5.0], 3.0),
            ([8.0, 7.0, 6.0], 4.0),
        ];
        let mut data = InputDataContainer::new(3);
        for (features, relevance) in rows.iter() {
            data.read_data_item(features, *relevance, 1).unwrap();
        }
        data.finalize_data().unwrap();
        data
    }

    /// Three queries whose relevance grows with the first feature.
    fn ranking_data() -> InputDataContainer {
        let docs = vec![
            FeatureSet::new_training_data(1, vec![0.9, 0.1, 3.0], 3),
            FeatureSet::new_training_data(1, vec![0.1, 0.7, 1.0], 0),
            FeatureSet::new_training_data(1, vec![0.5, 0.2, 2.0], 1),
            FeatureSet::new_training_data(1, vec![0.7, 0.9, 1.5], 2),
            FeatureSet::new_training_data(2, vec![0.3, 0.3, 0.5], 0),
            FeatureSet::new_training_data(2, vec![0.8, 0.4, 2.5], 2),
            FeatureSet::new_training_data(2, vec![0.6, 0.8, 0.7], 1),
            FeatureSet::new_training_data(3, vec![0.2, 0.6, 2.2], 0),
            FeatureSet::new_training_data(3, vec![0.95, 0.5, 0.2], 1),
        ];
        InputDataContainer::from_feature_sets(3, &docs).unwrap()
    }

    fn single_query(relevance: &[ValueType]) -> InputDataContainer {
        let mut data = InputDataContainer::new(1);
        for (i, rel) in relevance.iter().enumerate() {
            data.read_data_item(&[i as ValueType], *rel, 0).unwrap();
        }
        data.finalize_data().unwrap();
        data
    }

    #[test]
    fn walk_tree() {
        use crate::binary_tree::*;
        let mut tree: BinaryTree<f32> = BinaryTree::new();
        let root_index = tree.add_root(BinaryTreeNode::new(10.0));

        let n1_index = tree.add_left_node(root_index, BinaryTreeNode::new(5.0));
        let n2_index = tree.add_right_node(root_index, BinaryTreeNode::new(6.0));
        tree.add_left_node(n2_index, BinaryTreeNode::new(7.0));
        tree.add_right_node(n2_index, BinaryTreeNode::new(8.0));
        tree.add_left_node(n1_index, BinaryTreeNode::new(9.0));

        let values: Vec<f32> = tree.preorder().iter().map(|(_, n)| n.value).collect();
        assert_eq!(values, vec![10.0, 5.0, 9.0, 6.0, 7.0, 8.0]);
        assert_eq!(tree.len(), 6);
        let n1 = tree.get_node(n1_index).unwrap();
        assert!(tree.get_right_child(n1).is_none());
        assert!(!n1.is_leaf());
    }

    #[test]
    fn container_grows_past_initial_capacity() {
        let mut data = InputDataContainer::new(2);
        for i in 0..2500 {
            let x = i as ValueType;
            data.read_data_item(&[x, -x], (i % 5) as ValueType, (i / 10) as u64)
                .unwrap();
        }
        data.finalize_data().unwrap();
        assert!(data.is_finalized());
        assert_eq!(data.rows(), 2500);
        assert_eq!(data.data().len(), 5000);
        assert_eq!(data.row(1234), &[1234.0, -1234.0]);
        assert_eq!(data.value(17, 1), -17.0);
        assert_eq!(data.query_groups().len(), 250);
        assert_eq!(data.query_groups()[3], 30..40);
    }

    #[test]
    fn container_rejects_bad_rows() {
        let mut data = InputDataContainer::new(3);
        match data.read_data_item(&[1.0, 2.0], 0.0, 1) {
            Err(LtrError::FeatureSizeMismatch { expected, actual }) => {
                assert_eq!((expected, actual), (3, 2))
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(data.rows(), 0);

        let mut data = InputDataContainer::new(1);
        for qid in &[1, 1, 2, 1] {
            data.read_data_item(&[0.0], 0.0, *qid).unwrap();
        }
        match data.finalize_data() {
            Err(LtrError::UnsortedQueries { row }) => assert_eq!(row, 3),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn reference_container_shares_features() {
        let data = example_data();
        let targets: Vec<ValueType> = (0..8).map(|i| i as ValueType * 0.5).collect();
        let view = ReferenceDataContainer::with_outputs(&data, &targets).unwrap();
        assert_eq!(view.data().as_ptr(), data.data().as_ptr());
        assert_eq!(view.outputs(), &targets[..]);
        assert_eq!(view.query_groups(), data.query_groups());
        assert!(ReferenceDataContainer::with_outputs(&data, &targets[..3]).is_err());

        let features = [1.0, 2.0, 3.0, 4.0];
        let ids = [1, 2];
        let parts = ReferenceDataContainer::from_parts(2, &features, &[0.0, 1.0], &ids).unwrap();
        assert_eq!(parts.row(1), &[3.0, 4.0]);
        assert!(ReferenceDataContainer::from_parts(3, &features, &[0.0, 1.0], &ids).is_err());
    }

    #[test]
    fn example_tree_splits_below_root_error() {
        let data = example_data();
        let mut tree = RegressionTree::new();
        let assignment = tree.build_tree(&data, 0.0, 2).unwrap();

        let root = tree.root().unwrap().clone();
        assert_abs_diff_eq!(root.output, 2.5);
        assert_abs_diff_eq!(root.error, 10.0, epsilon = 1e-9);
        assert!(!root.is_leaf);

        let left = tree.node(1).unwrap();
        let right = tree.node(2).unwrap();
        assert!(left.error + right.error < root.error);
        assert!(tree.leaf_count() >= 2);
        assert_eq!(assignment.len(), 8);
        for leaf in &assignment {
            assert!(tree.node(*leaf).unwrap().is_leaf);
        }
        // every row is scored with the mean target of its leaf
        for (row, leaf) in assignment.iter().enumerate() {
            assert_abs_diff_eq!(tree.score(data.row(row)), tree.node(*leaf).unwrap().output);
        }
        assert!(tree.render().starts_with("0: 2.5 (err: "));
    }

    #[test]
    fn large_min_leaf_size_never_splits() {
        let data = example_data();
        let mut tree = RegressionTree::new();
        let assignment = tree.build_tree(&data, 0.0, 5).unwrap();
        assert_eq!(tree.len(), 1);
        assert!(tree.root().unwrap().is_leaf);
        assert!(assignment.iter().all(|id| *id == 0));
        assert_abs_diff_eq!(tree.score(&[100.0, 0.0, 0.0]), 2.5);
    }

    #[test]
    fn large_min_error_decrease_never_splits() {
        let data = example_data();
        let mut tree = RegressionTree::new();
        tree.build_tree(&data, 10.0, 1).unwrap();
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn tree_scores_leaf_means_of_training_points() {
        let mut data = InputDataContainer::new(2);
        let rows = [
            ([1.0, 5.0], 1.0),
            ([1.0, 5.0], 3.0),
            ([2.0, 4.0], 5.0),
            ([2.0, 4.0], 5.0),
            ([3.0, 4.0], 10.0),
        ];
        for (features, target) in rows.iter() {
            data.read_data_item(features, *target, 0).unwrap();
        }
        data.finalize_data().unwrap();

        let mut tree = RegressionTree::new();
        tree.build_tree(&data, 0.0, 1).unwrap();
        assert_abs_diff_eq!(tree.score(&[1.0, 5.0]), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(tree.score(&[2.0, 4.0]), 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(tree.score(&[3.0, 4.0]), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn constant_targets_stay_in_one_leaf() {
        let mut data = InputDataContainer::new(1);
        for i in 0..10 {
            data.read_data_item(&[i as ValueType], 0.1, 0).unwrap();
        }
        data.finalize_data().unwrap();

        let mut tree = RegressionTree::new();
        let leaves = tree.build_tree(&data, 0.0, 1).unwrap();
        assert_eq!(tree.len(), 1);
        assert!(leaves.iter().all(|id| *id == 0));
        assert_abs_diff_eq!(tree.score(&[3.0]), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn tied_values_stay_together() {
        let mut data = InputDataContainer::new(1);
        for (x, y) in &[(1.0, 0.0), (2.0, 10.0), (2.0, 0.0), (3.0, 10.0)] {
            data.read_data_item(&[*x], *y, 0).unwrap();
        }
        data.finalize_data().unwrap();
        let mut tree = RegressionTree::new();
        let assignment = tree.build_tree(&data, 0.0, 1).unwrap();
        assert_eq!(assignment[1], assignment[2]);
        for node in 0..tree.len() {
            let n = tree.node(node).unwrap();
            if !n.is_leaf {
                assert!(n.threshold != 2.0);
            }
        }
    }

    #[test]
    fn tree_build_errors() {
        let empty = InputDataContainer::new(2);
        let mut tree = RegressionTree::new();
        assert!(matches!(tree.build_tree(&empty, 0.0, 1), Err(LtrError::EmptyData)));
        assert!(matches!(
            tree.build_tree(&example_data(), 0.0, 0),
            Err(LtrError::InvalidConfig(_))
        ));
        assert_eq!(RegressionTree::new().score(&[1.0]), 0.0);
    }

    #[test]
    fn perfect_ranking_has_ndcg_one() {
        let relevance = [1.0, 2.0, 2.0, 1.0, 3.0, 4.0, 3.0, 4.0];
        let mut metric = NdcgMetric::new();
        metric.initialize(&relevance);
        metric.rankings(&relevance).unwrap();
        assert_abs_diff_eq!(metric.compute_ndcg(&relevance).unwrap(), 1.0, epsilon = 1e-12);

        // reversed order is worse
        let reversed: Vec<ValueType> = relevance.iter().map(|r| -r).collect();
        metric.rankings(&reversed).unwrap();
        assert!(metric.compute_ndcg(&relevance).unwrap() < 1.0);
    }

    #[test]
    fn ndcg_delta_describes_one_swap() {
        let relevance = [3.0, 2.0, 4.0, 1.0, 0.0];
        let mut metric = NdcgMetric::new();
        metric.initialize(&relevance);
        metric.rankings(&[3.0, 2.0, 1.0, 4.0, 0.5]).unwrap();
        for i in 0..relevance.len() {
            for j in 0..relevance.len() {
                // swapping i with j is swapping j with i
                let d_ij = metric.delta(&relevance, i, j).unwrap();
                let d_ji = metric.delta(&relevance, j, i).unwrap();
                assert_abs_diff_eq!(d_ij, d_ji, epsilon = 1e-12);
            }
        }
        assert_eq!(metric.delta(&relevance, 1, 1).unwrap(), 0.0);
        // document 2 (grade 4) is ranked fourth; moving it to the top helps
        assert!(metric.delta(&relevance, 2, 3).unwrap() > 0.0);
    }

    #[test]
    fn ndcg_delta_matches_swapped_ndcg() {
        let relevance = [3.0, 2.0, 4.0, 1.0];
        let scores = [3.0, 2.0, 1.0, 4.0];
        let mut metric = NdcgMetric::new();
        metric.initialize(&relevance);
        metric.rankings(&scores).unwrap();
        let before = metric.compute_ndcg(&relevance).unwrap();
        let delta = metric.delta(&relevance, 2, 3).unwrap();

        let swapped = [3.0, 2.0, 4.0, 1.0];
        metric.rankings(&swapped).unwrap();
        let after = metric.compute_ndcg(&relevance).unwrap();
        assert_abs_diff_eq!(after - before, delta, epsilon = 1e-12);
    }

    #[test]
    fn ndcg_metric_checks_call_order() {
        let relevance = [1.0, 0.0];
        let mut metric = NdcgMetric::new();
        assert!(matches!(
            metric.rankings(&[0.0, 1.0]),
            Err(LtrError::MetricState { operation: "rankings", required: "initialize" })
        ));
        assert!(matches!(
            metric.compute_ndcg(&relevance),
            Err(LtrError::MetricState { required: "initialize", .. })
        ));
        metric.initialize(&relevance);
        assert!(matches!(
            metric.delta(&relevance, 0, 1),
            Err(LtrError::MetricState { operation: "delta", required: "rankings" })
        ));
        assert!(metric.rank_of(0).is_none());
        assert!(matches!(
            metric.rankings(&[0.0, 1.0, 2.0]),
            Err(LtrError::LengthMismatch { expected: 2, actual: 3 })
        ));
        metric.rankings(&[0.0, 1.0]).unwrap();
        assert_eq!(metric.rank_of(1), Some(0));
        assert!(metric.delta(&relevance, 0, 1).is_ok());

        // re-initializing drops the ranking
        metric.initialize(&relevance);
        assert!(metric.compute_ndcg(&relevance).is_err());
    }

    #[test]
    fn ndcg_without_relevant_documents() {
        let relevance = [0.0, 0.0, 0.0];
        let mut metric = NdcgMetric::new();
        metric.initialize(&relevance);
        metric.rankings(&[0.3, 0.1, 0.2]).unwrap();
        assert_eq!(metric.idcg(), 0.0);
        assert_eq!(metric.compute_ndcg(&relevance).unwrap(), 1.0);
        assert_eq!(metric.delta(&relevance, 0, 2).unwrap(), 0.0);
        assert_eq!(NdcgEvaluator::new(10).evaluate_query(&relevance, &[0.3, 0.1, 0.2]), 1.0);
    }

    #[test]
    fn ndcg_at_cutoff() {
        let relevance = [0.0, 3.0, 1.0];
        let scores = [0.9, 0.5, 0.1];
        // ranking: doc0 (0), doc1 (3), doc2 (1)
        let at_1 = NdcgEvaluator::new(1).evaluate_query(&relevance, &scores);
        assert_eq!(at_1, 0.0);

        let at_2 = NdcgEvaluator::new(2).evaluate_query(&relevance, &scores);
        let idcg_2 = 7.0 + 1.0 / 3f64.log2();
        assert_abs_diff_eq!(at_2, (7.0 / 3f64.log2()) / idcg_2, epsilon = 1e-12);

        let full = NdcgEvaluator::new(0).evaluate_query(&relevance, &scores);
        let mut metric = NdcgMetric::new();
        metric.initialize(&relevance);
        metric.rankings(&scores).unwrap();
        assert_abs_diff_eq!(full, metric.compute_ndcg(&relevance).unwrap(), epsilon = 1e-12);
    }

    #[test]
    fn evaluator_averages_queries() {
        let data = ranking_data();
        let scores: Vec<ValueType> = data.outputs().to_vec();
        let evaluator = NdcgEvaluator::new(20);
        assert_abs_diff_eq!(evaluator.evaluate(&data, &scores).unwrap(), 1.0, epsilon = 1e-12);
        assert!(evaluator.evaluate(&data, &scores[..4]).is_err());
        assert!(matches!(
            evaluator.evaluate(&InputDataContainer::new(3), &[]),
            Err(LtrError::EmptyData)
        ));
    }

    #[test]
    fn equal_relevance_gives_zero_lambdas() {
        let data = single_query(&[2.0, 2.0, 2.0, 2.0]);
        let scores = [0.5, -1.0, 3.0, 0.0];
        for algorithm in &[Algorithm::RankNet, Algorithm::LambdaRank, Algorithm::LambdaMART] {
            let mut computer = LambdaGradientComputer::new(*algorithm, 1.0);
            let mut lambdas = vec![1.0; 4];
            let mut weights = vec![1.0; 4];
            computer.compute(&data, &scores, &mut lambdas, &mut weights).unwrap();
            assert!(lambdas.iter().all(|l| *l == 0.0));
            assert!(weights.iter().all(|w| *w == 0.0));
        }
    }

    #[test]
    fn lambdas_sum_to_zero_per_query() {
        let data = ranking_data();
        let scores = [0.3, -0.2, 1.5, 0.0, 0.7, 0.7, -1.1, 2.0, 0.4];
        for algorithm in &[Algorithm::RankNet, Algorithm::LambdaRank, Algorithm::LambdaMART] {
            let mut computer = LambdaGradientComputer::new(*algorithm, 2.0);
            let mut lambdas = vec![0.0; data.rows()];
            let mut weights = vec![0.0; data.rows()];
            computer.compute(&data, &scores, &mut lambdas, &mut weights).unwrap();
            for range in data.query_groups() {
                let sum: ValueType = lambdas[range].iter().sum();
                assert_abs_diff_eq!(sum, 0.0, epsilon = 1e-12);
            }
            assert!(lambdas.iter().any(|l| *l != 0.0));
            if *algorithm == Algorithm::LambdaMART {
                assert!(weights.iter().all(|w| *w > 0.0));
            } else {
                assert!(weights.iter().all(|w| *w == 0.0));
            }
        }
    }

    #[test]
    fn ranknet_lambda_of_a_single_pair() {
        let data = single_query(&[1.0, 0.0]);
        let mut computer = LambdaGradientComputer::new(Algorithm::RankNet, 1.0);
        let mut lambdas = vec![0.0; 2];
        let mut weights = vec![0.0; 2];
        computer.compute(&data, &[0.0, 0.0], &mut lambdas, &mut weights).unwrap();
        assert_abs_diff_eq!(lambdas[0], -0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(lambdas[1], 0.5, epsilon = 1e-12);

        // LambdaRank scales by |ΔnDCG|, which is 1 - 1/log2(3) here
        let mut computer = LambdaGradientComputer::new(Algorithm::LambdaRank, 1.0);
        computer.compute(&data, &[0.0, 0.0], &mut lambdas, &mut weights).unwrap();
        let delta = 1.0 - 1.0 / 3f64.log2();
        assert_abs_diff_eq!(lambdas[0], -0.5 * delta, epsilon = 1e-12);

        // the mirrored pair gets the mirrored lambdas
        let mirrored = single_query(&[0.0, 1.0]);
        let mut computer = LambdaGradientComputer::new(Algorithm::RankNet, 1.0);
        computer.compute(&mirrored, &[0.0, 0.0], &mut lambdas, &mut weights).unwrap();
        assert_abs_diff_eq!(lambdas[0], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(lambdas[1], -0.5, epsilon = 1e-12);
    }

    #[test]
    fn single_document_queries_are_silent() {
        let docs = vec![
            FeatureSet::new_training_data(1, vec![1.0], 3),
            FeatureSet::new_training_data(2, vec![2.0], 0),
        ];
        let data = InputDataContainer::from_feature_sets(1, &docs).unwrap();
        let mut computer = LambdaGradientComputer::new(Algorithm::LambdaMART, 1.0);
        let mut lambdas = vec![9.0; 2];
        let mut weights = vec![9.0; 2];
        computer.compute(&data, &[0.1, 0.2], &mut lambdas, &mut weights).unwrap();
        assert_eq!(lambdas, vec![0.0, 0.0]);
        assert_eq!(weights, vec![0.0, 0.0]);
    }

    #[test]
    fn reused_computer_follows_new_grades() {
        let first = single_query(&[1.0, 0.0, 0.0]);
        let second = single_query(&[4.0, 0.0, 3.0]);
        let scores = [0.5, 0.2, 0.1];

        let mut reused = LambdaGradientComputer::new(Algorithm::LambdaMART, 1.0);
        let mut lambdas = vec![0.0; 3];
        let mut weights = vec![0.0; 3];
        reused.compute(&first, &scores, &mut lambdas, &mut weights).unwrap();
        reused.compute(&second, &scores, &mut lambdas, &mut weights).unwrap();

        let mut fresh = LambdaGradientComputer::new(Algorithm::LambdaMART, 1.0);
        let mut fresh_lambdas = vec![0.0; 3];
        let mut fresh_weights = vec![0.0; 3];
        fresh
            .compute(&second, &scores, &mut fresh_lambdas, &mut fresh_weights)
            .unwrap();

        for i in 0..3 {
            assert_abs_diff_eq!(lambdas[i], fresh_lambdas[i], epsilon = 1e-12);
            assert_abs_diff_eq!(weights[i], fresh_weights[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn parallel_lambdas_match_per_query_lambdas() {
        let data = ranking_data();
        let scores = [0.1, 0.4, -0.3, 1.0, 0.0, 0.2, 0.2, -0.5, 0.9];
        let mut computer = LambdaGradientComputer::new(Algorithm::LambdaMART, 1.0);
        computer.initialize(&data);
        let mut lambdas = vec![0.0; data.rows()];
        let mut weights = vec![0.0; data.rows()];
        computer.compute(&data, &scores, &mut lambdas, &mut weights).unwrap();

        for range in data.query_groups() {
            let relevance = &data.outputs()[range.clone()];
            let mut metric = NdcgMetric::new();
            metric.initialize(relevance);
            let mut query_lambdas = vec![0.0; range.len()];
            let mut query_weights = vec![0.0; range.len()];
            computer
                .compute_query(
                    &mut metric,
                    relevance,
                    &scores[range.clone()],
                    &mut query_lambdas,
                    &mut query_weights,
                )
                .unwrap();
            assert_eq!(&lambdas[range.clone()], &query_lambdas[..]);
            assert_eq!(&weights[range], &query_weights[..]);
        }
    }

    #[test]
    fn lambda_output_length_is_checked() {
        let data = ranking_data();
        let mut computer = LambdaGradientComputer::new(Algorithm::LambdaRank, 1.0);
        let mut lambdas = vec![0.0; 3];
        let mut weights = vec![0.0; data.rows()];
        assert!(matches!(
            computer.compute(&data, &[0.0; 9], &mut lambdas, &mut weights),
            Err(LtrError::LengthMismatch { expected: 9, actual: 3 })
        ));
    }

    #[test]
    fn linear_learning_rate_sequence() {
        let mut lr = LinearLearningRate::new(0.9, 0.1, 0.15).unwrap();
        let expected = [0.9, 0.8, 0.7, 0.6, 0.5, 0.4, 0.3, 0.2];
        for (i, value) in expected.iter().enumerate() {
            assert_abs_diff_eq!(lr.get(), *value, epsilon = 1e-9);
            if i + 1 < expected.len() {
                assert!(lr.advance());
            }
        }
        assert!(!lr.advance());
        assert_abs_diff_eq!(lr.get(), 0.15);
        assert!(!lr.advance());
        assert_abs_diff_eq!(lr.get(), 0.15);

        lr.reset();
        assert_abs_diff_eq!(lr.get(), 0.9);
    }

    #[test]
    fn learning_rate_parameter_errors() {
        assert!(ConstantLearningRate::new(0.0).is_err());
        assert!(LinearLearningRate::new(0.0, 0.1, 0.0).is_err());
        assert!(LinearLearningRate::new(0.5, 0.1, -0.1).is_err());
        assert!(LinearLearningRate::new(0.5, 0.1, 0.5).is_err());
        assert!(CompositeLearningRate::new(Vec::new()).is_err());

        for descriptor in &[
            "constant:0",
            "constant:-0.5",
            "constant:abc",
            "linear:0.9:0.1",
            "linear:0.9:0.1:0.15:0.1",
            "linear:0.1:0.1:0.9",
            "composite:",
            "composite",
            "exponential:0.5",
            "",
        ] {
            match create_learning_rate_function(descriptor) {
                Err(LtrError::InvalidLearningRate(_)) => {}
                other => panic!("{:?} gave {:?}", descriptor, other),
            }
        }
    }

    #[test]
    fn learning_rate_descriptors() {
        let lr = create_learning_rate_function("ConstantLearningRate:0.25").unwrap();
        assert_eq!(lr, LearningRate::Constant(ConstantLearningRate::new(0.25).unwrap()));

        let lr: LearningRate = "LinearLearningRate:0.9:0.1:0.15".parse().unwrap();
        assert_eq!(lr.to_string(), "linear:0.9:0.1:0.15");

        let lr = create_learning_rate_function("composite:linear:0.9:0.2:0.15;constant:0.5").unwrap();
        match &lr {
            LearningRate::Composite(c) => assert_eq!(c.parts().len(), 2),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(lr.to_string(), "composite:linear:0.9:0.2:0.15;constant:0.5");
        let round_trip: LearningRate = lr.to_string().parse().unwrap();
        assert_eq!(round_trip, lr);
    }

    #[test]
    fn composite_learning_rate_runs_parts_in_order() {
        let mut lr = create_learning_rate_function("composite:linear:0.9:0.4:0.2;linear:0.3:0.1:0.1").unwrap();
        let mut seen = vec![lr.get()];
        while lr.advance() {
            seen.push(lr.get());
        }
        // every part shows its clamped end for one round before the next starts
        let expected = [0.9, 0.5, 0.2, 0.3, 0.2, 0.1];
        assert_eq!(seen.len(), expected.len());
        for (value, expected) in seen.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*value, *expected, epsilon = 1e-9);
        }
        assert!(!lr.advance());

        lr.reset();
        assert_abs_diff_eq!(lr.get(), 0.9);
        assert!(lr.advance());
        assert_abs_diff_eq!(lr.get(), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn config_defaults_and_validation() {
        let cfg = Config::new();
        assert_eq!(cfg.iterations, 100);
        assert_eq!(cfg.algorithm, Algorithm::LambdaMART);
        assert_eq!(cfg.ndcg_cutoff, 20);
        assert_abs_diff_eq!(cfg.learning_rate.get(), 0.1);
        assert!(cfg.validate().is_ok());
        assert!(cfg.to_string().contains("learning rate = constant:0.1"));

        let mut bad = cfg.clone();
        bad.set_min_leaf_size(0);
        assert!(matches!(bad.validate(), Err(LtrError::InvalidConfig(_))));
        let mut bad = cfg.clone();
        bad.set_sigma(0.0);
        assert!(bad.validate().is_err());
        let mut bad = cfg.clone();
        bad.set_feature_sample_ratio(1.5);
        assert!(bad.validate().is_err());
        let mut bad = cfg;
        assert!(bad.set_learning_rate("linear:1").is_err());
        assert_abs_diff_eq!(bad.learning_rate.get(), 0.1);
    }

    #[test]
    fn algorithm_names() {
        assert_eq!(string2algorithm("ranknet"), Algorithm::RankNet);
        assert_eq!(string2algorithm("LambdaRank"), Algorithm::LambdaRank);
        assert_eq!(string2algorithm("LAMBDAMART"), Algorithm::LambdaMART);
        for algorithm in &[Algorithm::RankNet, Algorithm::LambdaRank, Algorithm::LambdaMART] {
            assert_eq!(string2algorithm(&algorithm2string(algorithm)), *algorithm);
        }
    }

    #[test]
    fn config_serializes_learning_rate_as_descriptor() {
        let mut cfg = Config::new();
        cfg.set_learning_rate("linear:0.9:0.1:0.15").unwrap();
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"linear:0.9:0.1:0.15\""));
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn ensemble_sums_weighted_trees() {
        let data = example_data();
        let mut tree0 = RegressionTree::new();
        tree0.build_tree(&data, 0.0, 2).unwrap();

        let targets: Vec<ValueType> = data.outputs().iter().map(|r| 4.0 - r).collect();
        let view = ReferenceDataContainer::with_outputs(&data, &targets).unwrap();
        let mut tree1 = RegressionTree::new();
        tree1.build_tree(&view, 0.0, 3).unwrap();

        let mut ensemble = Ensemble::new();
        ensemble.push(tree0.clone(), 0.5);
        ensemble.push(tree1.clone(), 0.5);
        for row in 0..data.rows() {
            let x = data.row(row);
            assert_abs_diff_eq!(
                ensemble.score(x),
                0.5 * (tree0.score(x) + tree1.score(x)),
                epsilon = 1e-12
            );
            assert_abs_diff_eq!(ensemble.score_n(x, 1), 0.5 * tree0.score(x), epsilon = 1e-12);
        }
        assert_eq!(ensemble.len(), 2);
    }

    #[test]
    fn driver_scores_are_the_weighted_tree_sum() {
        let data = ranking_data();
        let mut cfg = Config::new();
        cfg.set_feature_size(3);
        cfg.set_iterations(2);
        cfg.set_learning_rate("constant:0.5").unwrap();
        let mut model = LambdaMART::new(&cfg);
        model.fit(&data).unwrap();

        let trees = model.ensemble().trees();
        assert_eq!(trees.len(), 2);
        let predicted = model.predict(&data).unwrap();
        for row in 0..data.rows() {
            let x = data.row(row);
            assert_abs_diff_eq!(trees[0].1, 0.5);
            assert_abs_diff_eq!(
                predicted[row],
                0.5 * (trees[0].0.score(x) + trees[1].0.score(x)),
                epsilon = 1e-12
            );
            assert_abs_diff_eq!(model.score(x), predicted[row], epsilon = 1e-12);
        }
    }

    #[test]
    fn training_improves_ndcg() {
        let data = ranking_data();
        let evaluator = NdcgEvaluator::new(20);
        // all-equal scores rank documents in row order
        let before = evaluator.evaluate(&data, &vec![0.0; data.rows()]).unwrap();

        for algorithm in &["ranknet", "lambdarank", "lambdamart"] {
            let mut cfg = Config::new();
            cfg.set_feature_size(3);
            cfg.set_iterations(20);
            cfg.set_algorithm(algorithm);
            cfg.set_learning_rate("constant:0.3").unwrap();
            let mut model = LambdaMART::new(&cfg);
            model.fit(&data).unwrap();
            let after = model.evaluate(&data).unwrap();
            assert!(after > before, "{}: {} <= {}", algorithm, after, before);
            if *algorithm == "ranknet" {
                assert_abs_diff_eq!(after, 1.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn exhausted_learning_rate_stops_training() {
        let data = ranking_data();
        let mut cfg = Config::new();
        cfg.set_feature_size(3);
        cfg.set_iterations(100);
        cfg.set_learning_rate("linear:0.9:0.1:0.15").unwrap();
        let mut model = LambdaMART::new(&cfg);
        model.fit(&data).unwrap();

        let weights: Vec<ValueType> = model.ensemble().trees().iter().map(|(_, w)| *w).collect();
        let expected = [0.9, 0.8, 0.7, 0.6, 0.5, 0.4, 0.3, 0.2];
        assert_eq!(weights.len(), expected.len());
        for (w, e) in weights.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*w, *e, epsilon = 1e-9);
        }

        // a second fit starts from the beginning of the schedule
        model.fit(&data).unwrap();
        assert_eq!(model.ensemble().len(), expected.len());
    }

    #[test]
    fn early_stopping_restores_best_round() {
        let train = ranking_data();
        // same documents, reversed grades: every improvement on train hurts here
        let docs: Vec<FeatureSet> = (0..train.rows())
            .map(|row| {
                let max = train.query_groups().iter().find(|g| g.contains(&row)).map_or(0.0, |g| {
                    train.outputs()[g.clone()].iter().cloned().fold(0.0, ValueType::max)
                });
                FeatureSet::new_training_data(
                    train.query_ids()[row],
                    train.row(row).to_vec(),
                    (max - train.outputs()[row]) as u32,
                )
            })
            .collect();
        let valid = InputDataContainer::from_feature_sets(3, &docs).unwrap();

        let mut cfg = Config::new();
        cfg.set_feature_size(3);
        cfg.set_iterations(10);
        cfg.set_learning_rate("constant:0.5").unwrap();
        cfg.set_early_stop_rounds(2);

        let mut model = LambdaMART::new(&cfg);
        model.fit_with_validation(&train, &valid).unwrap();
        assert_eq!(model.ensemble().len(), 1);

        cfg.set_early_stop_rounds(0);
        let mut model = LambdaMART::new(&cfg);
        model.fit_with_validation(&train, &valid).unwrap();
        assert_eq!(model.ensemble().len(), 10);
    }

    #[test]
    fn newton_leaves_use_second_order_weights() {
        let data = single_query(&[1.0, 0.0]);
        let mut cfg = Config::new();
        cfg.set_feature_size(1);
        cfg.set_iterations(1);
        cfg.set_learning_rate("constant:0.1").unwrap();
        cfg.enable_newton_leaves(true);
        let mut model = LambdaMART::new(&cfg);
        model.fit(&data).unwrap();

        // each document gets a leaf; with equal scores target / weight is
        // (|Δ| / 2) / (|Δ| / 4) = 2
        let scores = model.predict(&data).unwrap();
        assert_abs_diff_eq!(scores[0], 0.2, epsilon = 1e-9);
        assert_abs_diff_eq!(scores[1], -0.2, epsilon = 1e-9);

        cfg.enable_newton_leaves(false);
        let mut model = LambdaMART::new(&cfg);
        model.fit(&data).unwrap();
        let delta = 1.0 - 1.0 / 3f64.log2();
        assert_abs_diff_eq!(model.predict(&data).unwrap()[0], 0.1 * 0.5 * delta, epsilon = 1e-9);
    }

    #[test]
    fn fit_rejects_bad_input() {
        let data = ranking_data();
        let mut cfg = Config::new();
        cfg.set_feature_size(4);
        let mut model = LambdaMART::new(&cfg);
        assert!(matches!(
            model.fit(&data),
            Err(LtrError::FeatureSizeMismatch { expected: 4, actual: 3 })
        ));

        let mut model = LambdaMART::new(&Config::new());
        assert!(matches!(model.fit(&InputDataContainer::new(3)), Err(LtrError::EmptyData)));

        let mut cfg = Config::new();
        cfg.set_min_leaf_size(0);
        let mut model = LambdaMART::new(&cfg);
        assert!(matches!(model.fit(&data), Err(LtrError::InvalidConfig(_))));
    }

    #[test]
    fn validation_set_must_match_training_width() {
        let train = ranking_data();
        let valid = single_query(&[1.0, 0.0]);
        let mut model = LambdaMART::new(&Config::new());
        assert!(matches!(
            model.fit_with_validation(&train, &valid),
            Err(LtrError::FeatureSizeMismatch { expected: 3, actual: 1 })
        ));
        assert!(model.ensemble().is_empty());
    }

    #[test]
    fn model_json_round_trip() {
        let data = ranking_data();
        let mut cfg = Config::new();
        cfg.set_feature_size(3);
        cfg.set_iterations(5);
        let mut model = LambdaMART::new(&cfg);
        model.fit(&data).unwrap();
        let expected = model.predict(&data).unwrap();

        let same_scores = |scores: Vec<ValueType>| {
            assert_eq!(scores.len(), expected.len());
            for (a, b) in scores.iter().zip(expected.iter()) {
                assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
            }
        };

        let json = model.to_json().unwrap();
        let restored = LambdaMART::from_json(&json).unwrap();
        same_scores(restored.predict(&data).unwrap());
        assert_eq!(restored.config(), model.config());
        assert_eq!(restored.ensemble().len(), 5);

        let path = std::env::temp_dir().join(format!("ltr-model-{}.json", std::process::id()));
        let filename = path.to_str().unwrap();
        model.save_model(filename).unwrap();
        let loaded = LambdaMART::load_model(filename).unwrap();
        std::fs::remove_file(&path).unwrap();
        same_scores(loaded.predict(&data).unwrap());

        assert!(matches!(
            LambdaMART::load_model("/nonexistent/ltr.model"),
            Err(LtrError::IO(_))
        ));
        assert!(matches!(LambdaMART::from_json("{"), Err(LtrError::SerdeJson(_))));
    }

    #[test]
    fn feature_subsampling_still_trains() {
        let data = ranking_data();
        let mut cfg = Config::new();
        cfg.set_feature_size(3);
        cfg.set_iterations(30);
        cfg.set_feature_sample_ratio(0.4);
        cfg.set_learning_rate("constant:0.3").unwrap();
        let mut model = LambdaMART::new(&cfg);
        model.fit(&data).unwrap();
        assert_eq!(model.ensemble().len(), 30);
        assert!(model.predict(&data).unwrap().iter().all(|s| s.is_finite()));
    }

    #[test]
    fn ranknet_gradient_is_the_cost_derivative() {
        let sigma = 1.5;
        let (s_i, s_j) = (0.4, -0.2);
        let h = 1e-6;
        // i is the more relevant document, so the known probability is 1
        let cost = |s: ValueType| ranknet_cost(sigmoid(sigma, s, s_j), 1.0);
        let numeric = (cost(s_i + h) - cost(s_i - h)) / (2.0 * h);
        assert_abs_diff_eq!(ranknet_gradient(sigma, 1.0, s_i, s_j), numeric, epsilon = 1e-6);

        let cost = |s: ValueType| ranknet_cost(sigmoid(sigma, s, s_j), 0.0);
        let numeric = (cost(s_i + h) - cost(s_i - h)) / (2.0 * h);
        assert_abs_diff_eq!(ranknet_gradient(sigma, -1.0, s_i, s_j), numeric, epsilon = 1e-6);
    }

    #[test]
    fn scoring_test_documents() {
        let train = ranking_data();
        let mut cfg = Config::new();
        cfg.set_iterations(10);
        cfg.set_learning_rate("constant:0.3").unwrap();
        let mut model = LambdaMART::new(&cfg);
        model.fit(&train).unwrap();
        assert_eq!(model.config().feature_size, 3);

        let docs = vec![
            FeatureSet::new_test_data(10, vec![0.9, 0.1, 3.0], None),
            FeatureSet::new_test_data(10, vec![0.1, 0.7, 1.0], Some(0)),
        ];
        let mut test = InputDataContainer::from_feature_sets(3, &docs).unwrap();
        assert_eq!(test.outputs(), &[0.0, 0.0]);

        let scores = model.score_all(&test);
        assert_eq!(scores, model.predict(&test).unwrap());
        assert!(scores[0] > scores[1]);

        let mut scored = docs.clone();
        model.score_feature_sets(&mut scored).unwrap();
        assert_eq!(scored[0].score, scores[0]);
        assert_eq!(scored[1].score, scores[1]);
        let mut narrow = vec![FeatureSet::new_test_data(10, vec![0.5], None)];
        assert!(matches!(
            model.score_feature_sets(&mut narrow),
            Err(LtrError::FeatureSizeMismatch { expected: 3, actual: 1 })
        ));

        test.set_outputs(scores.clone()).unwrap();
        assert_eq!(test.outputs(), &scores[..]);
        assert!(test.set_outputs(vec![0.0]).is_err());
    }
}
