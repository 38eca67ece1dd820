//! Plain HTML rendering of view models.
//!
//! Deliberately minimal: the engine's contract ends at the
//! [`TableViewModel`], and this module only walks the finished model. A
//! real deployment swaps in its own renderer at this seam.

use std::fmt::Write as _;

use crate::viewmodel::{SidebarNode, TableViewModel};

/// Escape text for an HTML context.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// The landing page: visible tables with their shapes.
pub fn landing_page(tables: &[(String, usize, usize)], prefix: &str) -> String {
    let mut html = String::new();
    html.push_str("<!doctype html><html><head><title>Taxinomia</title></head><body>");
    html.push_str("<h1>Taxinomia</h1><ul>");
    for (name, rows, columns) in tables {
        let _ = write!(
            html,
            "<li><a href=\"{prefix}/table?table={}\">{}</a> ({rows} rows, {columns} columns)</li>",
            escape(name),
            escape(name)
        );
    }
    html.push_str("</ul></body></html>");
    html
}

/// One table view.
pub fn table_page(model: &TableViewModel) -> String {
    let mut html = String::new();
    html.push_str("<!doctype html><html><head><title>");
    html.push_str(&escape(&model.title));
    html.push_str("</title></head><body>");
    let _ = write!(html, "<h1>{}</h1>", escape(&model.title));

    for err in model
        .errors
        .computed_errors
        .iter()
        .chain(&model.errors.filter_errors)
    {
        let _ = write!(
            html,
            "<p class=\"error\">{}: {}</p>",
            escape(&err.column),
            escape(&err.message)
        );
    }

    html.push_str("<table border=\"1\"><thead><tr>");
    for header in &model.headers {
        let state = header.sort_state.unwrap_or("");
        let _ = write!(
            html,
            "<th class=\"{state}\"><a href=\"{}\">{}</a> <a href=\"{}\">#</a></th>",
            escape(&header.sort_url),
            escape(&header.label),
            escape(&header.group_url)
        );
    }
    html.push_str("</tr></thead><tbody>");

    for row in &model.rows {
        html.push_str("<tr>");
        for cell in row {
            if cell.rowspan == 0 {
                continue;
            }
            if cell.rowspan > 1 {
                let _ = write!(html, "<td rowspan=\"{}\">{}</td>", cell.rowspan, escape(&cell.text));
            } else {
                let _ = write!(html, "<td>{}</td>", escape(&cell.text));
            }
        }
        html.push_str("</tr>");
    }
    html.push_str("</tbody></table>");

    let _ = write!(
        html,
        "<p>{} of {} rows</p>",
        model.displayed_rows, model.total_rows
    );
    if let Some(more) = &model.pagination.more_url {
        let _ = write!(html, "<p><a href=\"{}\">more</a></p>", escape(more));
    }

    html.push_str("<h2>Columns</h2>");
    render_sidebar(&mut html, &model.sidebar);

    let t = &model.timings;
    let _ = write!(
        html,
        "<p class=\"timings\">parse {}us, cache {}us, joins {}us, compute {}us, filter {}us, group/sort {}us, view {}us</p>",
        t.parse_us, t.cache_lookup_us, t.join_reconcile_us, t.compute_us, t.filter_us, t.group_sort_us, t.view_model_us
    );
    html.push_str("</body></html>");
    html
}

fn render_sidebar(html: &mut String, nodes: &[SidebarNode]) {
    html.push_str("<ul>");
    for node in nodes {
        html.push_str("<li>");
        if let Some(url) = &node.add_url {
            let _ = write!(html, "<a href=\"{}\">{}</a>", escape(url), escape(&node.label));
        } else if node.blocked {
            let _ = write!(html, "<span class=\"blocked\">{}</span>", escape(&node.label));
        } else if let Some(url) = &node.toggle_url {
            let marker = if node.expanded { "-" } else { "+" };
            let _ = write!(
                html,
                "<a href=\"{}\">{marker} {}</a>",
                escape(url),
                escape(&node.label)
            );
        } else {
            html.push_str(&escape(&node.label));
        }
        if !node.children.is_empty() {
            render_sidebar(html, &node.children);
        }
        html.push_str("</li>");
    }
    html.push_str("</ul>");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn test_landing_page_lists_tables() {
        let html = landing_page(&[("orders".to_string(), 30, 5)], "/x");
        assert!(html.contains("/x/table?table=orders"));
        assert!(html.contains("30 rows"));
    }
}
