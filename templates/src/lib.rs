use leptos::{either::Either, prelude::*};

pub fn page_layout(title: &str, body_html: String) -> String {
    let title = title
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;");
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<style>
body {{ font-family: sans-serif; margin: 0; background: #f5f6f8; color: #1a1a1a; }}
header.site {{ display: flex; align-items: center; justify-content: space-between; padding: 10px 16px; background: #fff; border-bottom: 1px solid #ddd; }}
header.site h1 {{ font-size: 1.1em; margin: 0; }}
header.site nav a {{ margin-left: 12px; }}
header.site .user {{ font-size: 0.85em; color: #555; }}
main {{ max-width: 860px; margin: 0 auto; padding: 16px; }}
table {{ width: 100%; border-collapse: collapse; }}
th {{ text-align: left; padding: 6px 8px; border-bottom: 1px solid #ccc; }}
td {{ padding: 6px 8px; border-bottom: 1px solid #eee; vertical-align: top; }}
tr:last-child td {{ border-bottom: none; }}
form {{ display: inline; }}
.panel {{ background: #fff; border: 1px solid #ddd; border-radius: 6px; padding: 16px; margin-bottom: 16px; }}
.message {{ margin: 8px 0; padding: 10px 12px; border-radius: 8px; white-space: pre-wrap; word-break: break-word; }}
.message.user {{ background: #dbeafe; margin-left: 15%; }}
.message.assistant {{ background: #f1f5f9; margin-right: 15%; }}
.message.error {{ background: #fee2e2; }}
.message .meta {{ font-size: 0.75em; color: #666; margin-bottom: 4px; }}
.banner.error {{ background: #fee2e2; border: 1px solid #fca5a5; border-radius: 6px; padding: 8px 12px; margin-bottom: 12px; }}
.hidden {{ display: none; }}
textarea {{ width: 100%; box-sizing: border-box; resize: vertical; padding: 8px; font-family: inherit; }}
button {{ padding: 6px 14px; cursor: pointer; }}
.muted {{ color: #888; }}
.preview {{ color: #555; font-size: 0.9em; }}
</style>
</head>
<body>
{body_html}
</body>
</html>"#,
        title = title,
        body_html = body_html
    )
}

pub struct NavLink {
    pub label: String,
    pub href: String,
}

impl NavLink {
    pub fn new(label: impl ToString, href: impl ToString) -> Self {
        Self {
            label: label.to_string(),
            href: href.to_string(),
        }
    }
}

/// Identity shown in the page header.
pub struct HeaderUser {
    pub display_name: String,
    pub department: String,
}

pub struct Page<C: IntoView = ()> {
    pub title: String,
    pub heading: String,
    pub user: Option<HeaderUser>,
    pub nav_links: Vec<NavLink>,
    pub content: C,
}

impl<C: IntoView> Page<C> {
    pub fn render(self) -> String {
        let Page {
            title,
            heading,
            user,
            nav_links,
            content,
        } = self;

        let body = view! {
            <header class="site">
                <h1>{heading}</h1>
                <div>
                    {if let Some(user) = user {
                        Either::Left(view! {
                            <span class="user">
                                {user.display_name} " (" {user.department} ")"
                            </span>
                        })
                    } else {
                        Either::Right(())
                    }}
                    <nav style="display:inline">
                        {nav_links.into_iter().map(|link| {
                            view! { <a href={link.href}>{link.label}</a> }
                        }).collect::<Vec<_>>()}
                    </nav>
                </div>
            </header>
            <main>
                {content}
            </main>
        };

        page_layout(&title, body.to_html())
    }
}
