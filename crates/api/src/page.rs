use signalfeed_core::dashboard::{format_rsi, DashboardView, OpportunityCard, ViewState};
use std::fmt::Write;

pub enum PageContent<'a> {
    View(&'a DashboardView),
    Error(&'a str),
}

pub fn render(content: &PageContent<'_>, min_confidence: u8, refresh_secs: u64) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "<!doctype html>\n<html><head><meta charset=\"utf-8\">\
<meta http-equiv=\"refresh\" content=\"{refresh_secs}\">\
<title>Live Trade Signal Feed</title></head><body>\n\
<h1>Smart Trade Opportunity Feed</h1>\n\
<form method=\"get\" action=\"/\"><label>Minimum Confidence Score to Display \
<input type=\"number\" name=\"min_confidence\" min=\"0\" max=\"100\" \
value=\"{min_confidence}\"></label> \
<button type=\"submit\">Apply</button></form>\n"
    );

    match content {
        PageContent::Error(message) => {
            let _ = writeln!(out, "<p class=\"error\">{}</p>", escape(message));
        }
        PageContent::View(view) => match view.state {
            ViewState::NoOpportunities => {
                out.push_str(
                    "<p class=\"warning\">No trade opportunities currently ranked. \
Please try again soon.</p>\n",
                );
            }
            ViewState::FilteredOut => {
                out.push_str(
                    "<p class=\"info\">No opportunities meet your current filter. \
Try adjusting the minimum confidence.</p>\n",
                );
            }
            ViewState::Ready => {
                render_section(&mut out, "Buy Opportunities", &view.buys);
                render_section(&mut out, "Sell Opportunities", &view.sells);
            }
        },
    }

    out.push_str("</body></html>\n");
    out
}

fn render_section(out: &mut String, heading: &str, cards: &[OpportunityCard]) {
    if cards.is_empty() {
        return;
    }
    let _ = writeln!(out, "<h2>{heading}</h2>");
    for card in cards {
        let o = &card.opportunity;
        let _ = writeln!(out, "<section class=\"card\"><h3>{}</h3>", escape(&card.title()));
        let _ = writeln!(out, "<p><strong>News:</strong> {}</p>", escape(&o.headline));
        let _ = writeln!(
            out,
            "<ul><li>Sentiment: <code>{}</code></li><li>RSI: <code>{}</code></li>\
<li>MACD: <code>{}</code></li><li>Trend: <code>{}</code></li></ul>",
            o.sentiment,
            format_rsi(o.rsi),
            o.macd,
            o.trend_delta
        );
        if card.extreme_rsi {
            let _ = writeln!(
                out,
                "<p class=\"extreme\"><strong>Extreme RSI: {}</strong></p>",
                format_rsi(o.rsi)
            );
        }
        out.push_str("</section><hr>\n");
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
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
