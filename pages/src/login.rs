use leptos::{either::Either, prelude::*};
use templates::Page;

pub fn render_login(error: Option<&str>) -> String {
    let error = error.map(|e| e.to_string());

    let content = view! {
        {match error {
            Some(message) => Either::Left(view! {
                <div class="banner error">{message}</div>
            }),
            None => Either::Right(()),
        }}
        <div class="panel">
            <p>"Search internal rules and manuals through chat."</p>
            <p><a href="/auth/login"><button type="button">"Sign in with your corporate account"</button></a></p>
        </div>
    };

    Page {
        title: "RAG Chat - Sign in".to_string(),
        heading: "RAG Chat".to_string(),
        user: None,
        nav_links: vec![],
        content,
    }
    .render()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_page_links_to_auth_flow() {
        let html = render_login(None);
        assert!(html.contains("href=\"/auth/login\""));
    }

    #[test]
    fn login_page_shows_error_banner() {
        let html = render_login(Some("Access denied"));
        assert!(html.contains("Access denied"));
        assert!(html.contains("banner error"));
    }
}
