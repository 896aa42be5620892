//! html for the riddle pages. plain format! templates, no template engine.

use super::emoji::ranked_line;
use super::session::{Notice, Session};
use super::vision::data_url;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Nav {
    CloudRiddle,
    TimeLapse,
}

pub const TITLE: &str = "Cloud Riddle and Time-Lapse";

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; margin: 0; background: #eef4fb; color: #1d2a3a; }
nav { display: flex; gap: 1rem; padding: 0.75rem 1rem; background: #1d2a3a; }
nav a { color: #cfe3ff; text-decoration: none; }
nav a.active { color: #fff; font-weight: 600; }
main { max-width: 640px; margin: 0 auto; padding: 1.5rem 1rem 4rem; }
.notice { padding: 0.75rem 1rem; border-radius: 8px; margin-bottom: 1rem; }
.notice.info { background: #dff0ff; }
.notice.warning { background: #fff4d6; }
.notice.error { background: #ffe0e0; color: #7a1111; }
button { font-size: 1rem; padding: 0.6rem 1.1rem; border-radius: 8px; border: 0; background: #2f6fdf; color: #fff; }
img.photo { width: 200px; border-radius: 8px; display: block; margin: 1rem 0 0.25rem; }
.caption { font-size: 0.85rem; color: #5a6b7d; }
ol.similarities { list-style: none; padding: 0; font-size: 1.1rem; }
@media (max-width: 600px) { nav { position: fixed; bottom: 0; left: 0; right: 0; justify-content: space-around; } }
"#;

/// escape html special characters to prevent xss
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn layout(nav: Nav, notices: &[Notice], body: &str) -> String {
    let active = |n: Nav| if n == nav { " class=\"active\"" } else { "" };
    let notices: String = notices
        .iter()
        .map(|notice| {
            let (class, text) = match notice {
                Notice::Info(t) => ("info", t),
                Notice::Warning(t) => ("warning", t),
                Notice::Error(t) => ("error", t),
            };
            format!(r#"<div class="notice {}">{}</div>"#, class, html_escape(text))
        })
        .collect();

    format!(
        r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<style>{style}</style>
</head>
<body>
<nav><a href="/"{riddle}>☁️ Cloud Riddle</a><a href="/time-lapse"{lapse}>⏳ Time-Lapse</a></nav>
<main>
{notices}{body}
</main>
</body>
</html>"#,
        title = TITLE,
        style = STYLE,
        riddle = active(Nav::CloudRiddle),
        lapse = active(Nav::TimeLapse),
        notices = notices,
        body = body,
    )
}

pub fn landing(notices: &[Notice]) -> String {
    layout(
        Nav::CloudRiddle,
        notices,
        r#"<form method="post" action="/begin"><button type="submit">👀 Check my new cloud ☁️</button></form>"#,
    )
}

pub fn upload(notices: &[Notice]) -> String {
    layout(
        Nav::CloudRiddle,
        notices,
        r#"<h2>Upload Your Cloud Photo</h2>
<form method="post" action="/upload" enctype="multipart/form-data">
<input type="file" name="photo" accept=".jpg,.jpeg,.png" required>
<p><button type="submit">Confirm and Reveal the Riddle</button></p>
</form>"#,
    )
}

pub fn reveal(session: &Session, notices: &[Notice]) -> String {
    let photo = session
        .uploaded_image()
        .map(|img| {
            format!(
                r#"<img class="photo" src="{}" alt="cloud"><div class="caption">Uploaded Cloud Photo</div>"#,
                data_url(&img.bytes, &img.format)
            )
        })
        .unwrap_or_default();

    let mut body = format!(
        r#"{photo}
<form method="post" action="/reveal">
<label>What objects do you think the cloud looks like?<br>
<input type="text" name="user_response" value="{response}"></label>
<p><button type="submit">Submit and Reveal the Riddle</button></p>
</form>"#,
        photo = photo,
        response = html_escape(session.user_response()),
    );

    if session.analysis_complete() {
        let items: String = session
            .extracted_results()
            .iter()
            .enumerate()
            .map(|(i, s)| format!("<li>{}</li>", html_escape(&ranked_line(i + 1, s))))
            .collect();
        body.push_str(&format!(
            r#"<h3>Top 5 Similarities:</h3>
<ol class="similarities">{}</ol>
<form method="post" action="/next"><button type="submit">Check Next Cloud ☁️</button></form>"#,
            items
        ));
    }

    layout(Nav::CloudRiddle, notices, &body)
}

pub fn time_lapse() -> String {
    layout(
        Nav::TimeLapse,
        &[],
        "<h1>Time-Lapse Page</h1><p>This page will be implemented in the future.</p>",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::riddle::session::{Event, UploadedImage};

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape(r#"<b>"hi" & 'bye'</b>"#), "&lt;b&gt;&quot;hi&quot; &amp; &#39;bye&#39;&lt;/b&gt;");
    }

    #[test]
    fn test_notices_are_escaped_and_classed() {
        let html = landing(&[Notice::Error("<script>".into())]);
        assert!(html.contains(r#"<div class="notice error">&lt;script&gt;</div>"#));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_reveal_lists_results_only_after_analysis() {
        let mut s = Session::new();
        s.apply(Event::Begin).unwrap();
        s.apply(Event::Confirm(UploadedImage {
            bytes: vec![1, 2, 3],
            format: "png".into(),
            file_name: "a.png".into(),
        }))
        .unwrap();
        s.apply(Event::Respond("a \"big\" cat".into())).unwrap();

        let before = reveal(&s, &[]);
        assert!(before.contains("data:image/png;base64,AQID"));
        assert!(before.contains("a &quot;big&quot; cat"));
        assert!(!before.contains("Top 5 Similarities"));

        let request = s.begin_analysis().unwrap();
        s.apply(Event::AnalysisSucceeded { round: request.round, text: "Cat: 55% Whale: 10%".into() }).unwrap();
        let after = reveal(&s, &[]);
        assert!(after.contains("<li>1. 🐈 Cat: 55%</li>"));
        assert!(after.contains("<li>2.  Whale: 10%</li>"));
        assert!(after.contains("Check Next Cloud"));
    }

    #[test]
    fn test_time_lapse_placeholder() {
        let html = time_lapse();
        assert!(html.contains("This page will be implemented in the future."));
        assert!(html.contains(r#"<a href="/time-lapse" class="active">"#));
    }
}
