use super::{CrawlerView, ReportView};

/// Render a report view to Markdown
pub fn render(view: &ReportView) -> String {
    let mut output = String::new();

    // 1. Title and window
    render_header(&mut output, view);

    // 2. Summary with every total metric
    render_summary(&mut output, view);

    // 3. One section per crawler
    if !view.crawlers.is_empty() {
        output.push_str(&format!(
            "## 🕷️ Crawlers (by {})\n\n",
            view.sort_metric
        ));
        for crawler in &view.crawlers {
            render_crawler(&mut output, crawler);
        }
    }

    output
}

fn render_header(output: &mut String, view: &ReportView) {
    if view.from_day == view.to_day {
        output.push_str(&format!("# 📊 Crawler statistics: {}\n", view.from_day));
    } else {
        output.push_str(&format!(
            "# 📊 Crawler statistics: {} to {}\n",
            view.from_day, view.to_day
        ));
    }
    output.push_str(&format!("- **Period:** {}\n", view.period));
    output.push_str(&format!("- **Window:** {} → {}\n", view.from, view.to));
    output.push_str(&format!("- **Report key:** `{}`\n", view.key));
    output.push('\n');
}

fn render_summary(output: &mut String, view: &ReportView) {
    output.push_str("## Summary\n");
    output.push_str(&format!("- **Executions:** {}\n", view.executions));
    output.push_str(&format!("- **Crawlers:** {}\n", view.crawlers_count));
    for metric in &view.totals {
        output.push_str(&format!("- **{}:** {}\n", metric.name, metric.value));
    }
    if view.crawlers.is_empty() {
        output.push_str("\n*No crawler finished an execution in this window.*\n");
    }
    output.push('\n');
}

fn render_crawler(output: &mut String, crawler: &CrawlerView) {
    if crawler.name == crawler.id {
        output.push_str(&format!("### {}\n", crawler.name));
    } else {
        output.push_str(&format!("### {} (`{}`)\n", crawler.name, crawler.id));
    }
    output.push_str(&format!("- **Executions:** {}", crawler.executions));
    if !crawler.statuses.is_empty() {
        let statuses: Vec<String> = crawler
            .statuses
            .iter()
            .map(|s| format!("{} {}", s.count, s.status))
            .collect();
        output.push_str(&format!(" ({})", statuses.join(", ")));
    }
    output.push('\n');
    for metric in &crawler.metrics {
        output.push_str(&format!("- **{}:** {}\n", metric.name, metric.value));
    }
    output.push('\n');

    if crawler.tags.is_empty() {
        return;
    }

    // Per-tag table
    output.push_str("| Tag | Executions |");
    for name in &crawler.metric_names {
        output.push_str(&format!(" {} |", name));
    }
    output.push('\n');
    output.push_str("|---|---:|");
    for _ in &crawler.metric_names {
        output.push_str("---:|");
    }
    output.push('\n');
    for tag in &crawler.tags {
        output.push_str(&format!("| {} | {} |", escape_cell(&tag.tag), tag.executions));
        for value in &tag.values {
            output.push_str(&format!(" {} |", value));
        }
        output.push('\n');
    }
    output.push('\n');
}

/// Tags are free text; a pipe would split the cell
fn escape_cell(s: &str) -> String {
    s.replace('|', "\\|")
}
