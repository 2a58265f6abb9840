use std::fmt::Write;

use crate::models::{EntitySeries, ScoreSummary};

/// Entities ordered most popular first (lowest score), ties by id.
pub fn ranked(summary: &ScoreSummary) -> Vec<(usize, &str, f64)> {
    let mut scores: Vec<_> = summary.scores.iter().collect();
    scores.sort_by(|a, b| {
        a.score
            .total_cmp(&b.score)
            .then_with(|| a.entity_id.cmp(&b.entity_id))
    });
    scores
        .into_iter()
        .enumerate()
        .map(|(rank, s)| (rank + 1, s.entity_id.as_str(), s.score))
        .collect()
}

pub fn build_report(summary: Option<&ScoreSummary>, series: &[EntitySeries], year: i32) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Popularity Report");
    let _ = writeln!(
        output,
        "Generated for {} entities with recorded views",
        series.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Ranking");

    match summary {
        Some(summary) => {
            let _ = writeln!(
                output,
                "System average: {:.2} views per week across {} periods.",
                summary.system_average, summary.period_count
            );
            let _ = writeln!(output);
            for (rank, entity_id, score) in ranked(summary) {
                let _ = writeln!(output, "{}. {} (score {:.3})", rank, entity_id, score);
            }
        }
        None => {
            let _ = writeln!(output, "Not enough distinct traffic to rank entities.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Weekly Views in {}", year);

    let mut any = false;
    for entity in series {
        let weeks: Vec<String> = entity
            .periods
            .iter()
            .filter(|p| p.period.year == year)
            .map(|p| format!("W{:02}={}", p.period.week, p.count))
            .collect();
        if weeks.is_empty() {
            continue;
        }
        any = true;
        let _ = writeln!(output, "- {}: {}", entity.entity_id, weeks.join(", "));
    }

    if !any {
        let _ = writeln!(output, "No views recorded for this year.");
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityScore, PeriodCount};
    use crate::period::Period;

    fn sample_series() -> Vec<EntitySeries> {
        vec![
            EntitySeries {
                entity_id: "a".to_string(),
                periods: vec![
                    PeriodCount {
                        period: Period::new(2020, 26),
                        count: 39,
                    },
                    PeriodCount {
                        period: Period::new(2020, 27),
                        count: 40,
                    },
                ],
            },
            EntitySeries {
                entity_id: "b".to_string(),
                periods: vec![PeriodCount {
                    period: Period::new(2019, 52),
                    count: 3,
                }],
            },
        ]
    }

    #[test]
    fn ranks_lowest_score_first() {
        let summary = ScoreSummary {
            entity_count: 3,
            period_count: 6,
            system_average: 20.0,
            scores: vec![
                EntityScore {
                    entity_id: "c".to_string(),
                    score: 0.5,
                },
                EntityScore {
                    entity_id: "a".to_string(),
                    score: 1.0,
                },
                EntityScore {
                    entity_id: "b".to_string(),
                    score: 0.0,
                },
            ],
        };

        let ranking: Vec<&str> = ranked(&summary).iter().map(|r| r.1).collect();
        assert_eq!(ranking, vec!["b", "c", "a"]);
    }

    #[test]
    fn report_lists_series_for_the_year() {
        let report = build_report(None, &sample_series(), 2020);
        assert!(report.contains("# Popularity Report"));
        assert!(report.contains("Not enough distinct traffic"));
        assert!(report.contains("- a: W26=39, W27=40"));
        assert!(!report.contains("- b:"));
    }

    #[test]
    fn report_without_views_says_so() {
        let report = build_report(None, &[], 2020);
        assert!(report.contains("No views recorded for this year."));
    }
}
