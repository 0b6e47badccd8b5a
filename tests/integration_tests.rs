// End-to-end tests: matrix directory and cluster table on disk, through the
// pipeline, to the written report.

#[cfg(test)]
mod integration_tests {
    use single_specificity::error::SpecificityError;
    use single_specificity::io::{MatrixDir, read_cluster_assignment, write_report, write_report_file};
    use single_specificity::testing::inference::MatrixSpecificityTests;
    use single_specificity::testing::{PValueAdjustment, ScoreMode, SpecificityConfig};
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    const N_CELLS: usize = 60;
    const GENES: [&str; 4] = ["MARKER", "HOUSEKEEPING", "ABSENT", "NOISE"];

    /// Cells 0..20 are cluster 1, 20..45 cluster 0, the rest unassigned.
    fn cell_cluster(cell: usize) -> Option<i64> {
        match cell {
            0..=19 => Some(1),
            20..=44 => Some(0),
            _ => None,
        }
    }

    fn count(gene: usize, cell: usize) -> u32 {
        let in_cluster = cell < 20;
        match gene {
            // 5/6 inside the cluster, absent outside
            0 => {
                if in_cluster {
                    5 + (cell % 2) as u32
                } else {
                    0
                }
            }
            // same 1/2 mix everywhere
            1 => 1 + (cell % 2) as u32,
            // only in two unclustered cells
            2 => {
                if cell == 50 || cell == 55 {
                    3
                } else {
                    0
                }
            }
            _ => ((cell * 7) % 5) as u32,
        }
    }

    fn write_dataset(dir: &Path) -> std::path::PathBuf {
        let mut entries = Vec::new();
        for cell in 0..N_CELLS {
            for gene in 0..GENES.len() {
                let value = count(gene, cell);
                if value > 0 {
                    entries.push(format!("{} {} {}", gene + 1, cell + 1, value));
                }
            }
        }
        // integer counts with a metadata comment, as Cell Ranger writes them
        let mut mtx = String::from("%%MatrixMarket matrix coordinate integer general\n");
        mtx.push_str("%metadata_json: {\"software_version\": \"cellranger-7.1.0\"}\n");
        mtx.push_str(&format!("{} {} {}\n", GENES.len(), N_CELLS, entries.len()));
        for entry in &entries {
            mtx.push_str(entry);
            mtx.push('\n');
        }
        fs::write(dir.join("matrix.mtx"), mtx).unwrap();

        let barcodes: String = (0..N_CELLS).map(|c| format!("CELL{:03}-1\n", c)).collect();
        fs::write(dir.join("barcodes.tsv"), barcodes).unwrap();

        let genes: String = GENES.iter().map(|g| format!("{}\n", g)).collect();
        fs::write(dir.join("genes.tsv"), genes).unwrap();

        let mut clusters = String::from("Barcode\tCluster\n");
        for cell in 0..N_CELLS {
            if let Some(id) = cell_cluster(cell) {
                clusters.push_str(&format!("CELL{:03}\t{}\n", cell, id));
            }
        }
        // unknown barcodes are ignored
        clusters.push_str("GHOST\t1\n");
        let path = dir.join("clusters.txt");
        fs::write(&path, clusters).unwrap();
        path
    }

    #[test]
    fn test_end_to_end_report() {
        let dir = tempdir().unwrap();
        let cluster_path = write_dataset(dir.path());

        let data = MatrixDir::load(dir.path()).unwrap();
        assert_eq!(data.matrix.nrows(), 4);
        assert_eq!(data.matrix.ncols(), N_CELLS);
        assert_eq!(data.barcodes[0], "CELL000");

        let clusters = read_cluster_assignment(&cluster_path, &data.barcodes).unwrap();
        assert_eq!(clusters.cluster_ids(), vec![0, 1]);
        assert_eq!(clusters.labels()[50], -1);

        let config = SpecificityConfig::new(1).with_score_mode(ScoreMode::Nonparametric);
        let results = data.matrix.cluster_specificity(&clusters, &config).unwrap();

        assert_eq!(results.total_in, 20);
        assert_eq!(results.total_out, 40);

        let marker = &results.results[0];
        println!("MARKER: {:?}", marker);
        assert!(marker.stat_combined < 1e-9);
        assert!(marker.p_value < 1e-6, "MARKER p = {}", marker.p_value);

        let housekeeping = &results.results[1];
        println!("HOUSEKEEPING: {:?}", housekeeping);
        assert!((housekeeping.stat_combined - 1.0).abs() < 1e-9);
        assert!(housekeeping.p_value > 0.9);

        assert_eq!(results.degenerate_indices(), vec![2]);
        assert_eq!(results.top_features(1), vec![0]);

        let report_path = dir.path().join("report.txt");
        write_report_file(&report_path, &data.genes, &results).unwrap();
        let report = fs::read_to_string(&report_path).unwrap();
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines.len(), 4);
        for line in &lines {
            assert_eq!(line.split(' ').count(), 9, "bad line: {}", line);
        }
        assert!(lines[0].starts_with("MARKER "));

        let fields: Vec<f64> = lines[0]
            .split(' ')
            .skip(1)
            .map(|f| f.parse().unwrap())
            .collect();
        assert_eq!(fields[0], results.ranking.scores[0]);
        assert!((fields[1] - 5.5).abs() < 1e-12);
        assert_eq!(fields[7], results.ranking.adjusted_p_values[0]);
    }

    #[test]
    fn test_reruns_are_byte_identical() {
        let dir = tempdir().unwrap();
        let cluster_path = write_dataset(dir.path());
        let data = MatrixDir::load(dir.path()).unwrap();
        let clusters = read_cluster_assignment(&cluster_path, &data.barcodes).unwrap();

        let mut outputs = Vec::new();
        for _ in 0..3 {
            let config = SpecificityConfig::new(1).with_score_mode(ScoreMode::Bounded);
            let results = data.matrix.cluster_specificity(&clusters, &config).unwrap();
            let mut buffer: Vec<u8> = Vec::new();
            write_report(&mut buffer, &data.genes, &results).unwrap();
            outputs.push(buffer);
        }
        assert_eq!(outputs[0], outputs[1]);
        assert_eq!(outputs[1], outputs[2]);
    }

    #[test]
    fn test_nonparametric_order_matches_stat_combined() {
        let dir = tempdir().unwrap();
        let cluster_path = write_dataset(dir.path());
        let data = MatrixDir::load(dir.path()).unwrap();
        let clusters = read_cluster_assignment(&cluster_path, &data.barcodes).unwrap();

        let config = SpecificityConfig::new(0)
            .with_score_mode(ScoreMode::Nonparametric)
            .with_adjustment(PValueAdjustment::BenjaminiHochberg);
        let results = data.matrix.cluster_specificity(&clusters, &config).unwrap();

        let mut expected: Vec<usize> = (0..results.n_genes()).collect();
        expected.sort_by(|&a, &b| {
            results.results[a]
                .stat_combined
                .total_cmp(&results.results[b].stat_combined)
                .then(a.cmp(&b))
        });
        assert_eq!(results.ranking.score_order, expected);

        for (raw, adj) in results
            .p_values()
            .iter()
            .zip(results.ranking.adjusted_p_values.iter())
        {
            assert!(*adj >= *raw && *adj <= 1.0);
        }
    }

    #[test]
    fn test_single_cell_cluster_is_rejected() {
        let dir = tempdir().unwrap();
        write_dataset(dir.path());
        let data = MatrixDir::load(dir.path()).unwrap();

        let mut labels = vec![0i64; N_CELLS];
        labels[7] = 9;
        let clusters = single_specificity::testing::utils::ClusterAssignment::new(labels);

        let err = data
            .matrix
            .cluster_specificity(&clusters, &SpecificityConfig::new(9))
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<SpecificityError>(),
            Some(&SpecificityError::DegenerateCluster {
                cluster_id: 9,
                cells: 1
            })
        );
    }

    #[test]
    fn test_gene_list_must_match_matrix() {
        let dir = tempdir().unwrap();
        write_dataset(dir.path());
        fs::write(dir.path().join("genes.tsv"), "ONLY_ONE\n").unwrap();

        let err = MatrixDir::load(dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SpecificityError>(),
            Some(SpecificityError::DimensionMismatch { what: "genes", .. })
        ));
    }
}
