
#[cfg(test)]
mod tests {
    use super::test_data::{base_error, mse, setup_friedman};
    use rand::{rngs::StdRng, SeedableRng};
    use tabletree::{
        table::{fit, ConstructionMode, TableParamsBuilder},
        Error, FittedModel,
    };

    #[test]
    fn test_every_mode_beats_the_mean() {
        let data = setup_friedman(1000, 5);
        let base_err = base_error(data.y_train.view(), data.y_test.view());
        for mode in [
            ConstructionMode::OnePass,
            ConstructionMode::MultiPass,
            ConstructionMode::MultiPassRandom,
        ] {
            let params = TableParamsBuilder::new().depth(5).mode(mode).n_passes(3).build();
            let mut rng = StdRng::seed_from_u64(42);
            let (fit_result, table) =
                fit(data.x_train.view(), data.y_train.view(), &params, &mut rng).unwrap();
            assert_eq!(table.depth(), 5);
            assert!(table.indices().len() <= 32);
            let test_err = mse(data.y_test.view(), table.predict(data.x_test.view()).view());
            println!("{mode:?}: train {:.4}, test {test_err:.4}, base {base_err:.4}", fit_result.err);
            assert!(test_err < base_err, "{mode:?} does not beat the mean");
        }
    }

    #[test]
    fn test_indices_are_sorted_and_fit_depth() {
        let data = setup_friedman(400, 6);
        let params = TableParamsBuilder::new()
            .depth(6)
            .mode(ConstructionMode::MultiPassRandom)
            .n_passes(4)
            .build();
        let mut rng = StdRng::seed_from_u64(7);
        let (_, table) = fit(data.x_train.view(), data.y_train.view(), &params, &mut rng).unwrap();
        assert!(table.indices().windows(2).all(|w| w[0] < w[1]));
        assert!(table.indices().iter().all(|&m| m < 1 << table.depth()));
        assert_eq!(table.indices().len(), table.predictions().len());
        assert_eq!(table.attributes().len(), table.thresholds().len());
    }

    #[test]
    fn test_too_deep_is_an_error() {
        let data = setup_friedman(20, 8);
        let params = TableParamsBuilder::new().depth(100).build();
        let mut rng = StdRng::seed_from_u64(0);
        let res = fit(data.x_train.view(), data.y_train.view(), &params, &mut rng);
        assert!(matches!(res, Err(Error::DepthTooLarge { depth: 100, max: 63 })));
    }
}
