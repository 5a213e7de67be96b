use approx::assert_relative_eq;
use shapeflow_index::{LatentIndex, LatentIndexError, LatentMatrix};

fn circle(num: usize) -> LatentMatrix {
    let rows = (0..num)
        .map(|i| {
            let angle = i as f32 * std::f32::consts::TAU / num as f32;
            vec![angle.cos(), angle.sin()]
        })
        .collect();
    LatentMatrix::from_rows(rows).unwrap()
}

#[test]
fn nearest_on_unit_circle() -> Result<(), LatentIndexError> {
    // ten codes at 36 degree steps; (1, 0) is code 0, codes 1 and 9 are equidistant
    let index = LatentIndex::new(circle(10));
    let query = LatentMatrix::from_rows(vec![vec![1.0, 0.0]])?;
    let res = index.query(&query, 3)?;

    assert_eq!(res.indices[0][0], 0);
    let mut ring = res.indices[0][1..].to_vec();
    ring.sort_unstable();
    assert_eq!(ring, vec![1, 9]);
    assert_relative_eq!(res.distances[0][0], 0.0, epsilon = 1e-6);
    let chord = 2.0 * (std::f32::consts::PI / 10.0).sin();
    assert_relative_eq!(res.distances[0][1], chord, epsilon = 1e-5);
    assert_relative_eq!(res.distances[0][2], chord, epsilon = 1e-5);
    assert!(res.distances[0].windows(2).all(|w| w[0] <= w[1]));
    Ok(())
}

#[test]
fn nearest_on_rotated_query() -> Result<(), LatentIndexError> {
    let index = LatentIndex::new(circle(10));
    // 100 degrees: closest codes are at 108, 72 and 144 degrees
    let angle = 100f32.to_radians();
    let query = LatentMatrix::from_rows(vec![vec![angle.cos(), angle.sin()]])?;
    let res = index.query(&query, 3)?;
    assert_eq!(res.indices, vec![vec![3, 2, 4]]);
    Ok(())
}

#[test]
fn k_equal_to_len_returns_every_code_once() -> Result<(), LatentIndexError> {
    let index = LatentIndex::new(circle(10));
    let queries = LatentMatrix::from_rows(vec![vec![0.3, -0.2], vec![-1.0, 0.0]])?;
    let res = index.query(&queries, 10)?;
    for row in res.indices {
        let mut sorted = row.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..10).collect::<Vec<_>>());
    }
    assert!(matches!(
        index.query(&queries, 11),
        Err(LatentIndexError::InvalidQuery { k: 11, len: 10 })
    ));
    Ok(())
}
