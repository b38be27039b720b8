use crate::{
    auth::SchoolSession,
    config::RuntimeConfiguration,
    error::{GetDatabaseConnectionSnafu, MigrateSnafu, OpenDatabaseSnafu, SchoolResult},
    maud_conveniences::{render_nav, render_notifications},
    routes::sse::SseEvent,
};
use maud::{DOCTYPE, Markup, html};
use snafu::ResultExt;
use sqlx::{Pool, Postgres, Transaction, pool::PoolConnection, postgres::PgPoolOptions};
use std::ops::Deref;
use tokio::sync::broadcast::{Receiver, Sender, channel};

///htmx drops 4xx/5xx bodies unless told otherwise, and errors carry the alert to show
const HTMX_CONFIG: &str = r#"{"responseHandling":[{"code":"204","swap":false},{"code":"[23]..","swap":true},{"code":"[45]..","swap":true,"error":true}]}"#;

fn head() -> Markup {
    html! {
        head {
            meta charset="UTF-8" {}
            meta name="viewport" content="width=device-width, initial-scale=1.0" {}
            meta name="htmx-config" content=(HTMX_CONFIG) {}
            script src="https://unpkg.com/htmx.org@2.0.4" integrity="sha384-HGfztofotfshcF7+8n44JQL2oJmowVChPTg48S+jvZoztPfvwD79OC/LTtG6dMp+" crossorigin="anonymous" {}
            script src="https://unpkg.com/htmx-ext-sse@2.2.3" integrity="sha384-Y4gc0CK6Kg+hmulDc6rZPJu0tqvk7EWlih0Oh+2OkAi1ZDlCbBDCQEE2uVk472Ky" crossorigin="anonymous" {}
            script src="https://cdn.jsdelivr.net/npm/@tailwindcss/browser@4" {}
            title { "Schoolyard" }
        }
    }
}

#[derive(Clone, Debug)]
pub struct SchoolState {
    pool: Pool<Postgres>,
    config: RuntimeConfiguration,
    sse_events_sender: Sender<SseEvent>,
}

impl SchoolState {
    pub async fn new(options: PgPoolOptions, config: RuntimeConfiguration) -> SchoolResult<Self> {
        let pool = options
            .connect(&config.db_config().get_db_path())
            .await
            .context(OpenDatabaseSnafu)?;

        sqlx::migrate!().run(&pool).await.context(MigrateSnafu)?;

        let (tx, _rx) = channel(16);

        Ok(Self {
            pool,
            config,
            sse_events_sender: tx,
        })
    }

    #[allow(clippy::unused_self, clippy::needless_pass_by_value)] //in case self is ever needed :), and to allow direct html! usage
    pub fn render(&self, auth_session: SchoolSession, markup: Markup) -> Markup {
        let nav = render_nav(auth_session.user.as_ref());

        html! {
            (DOCTYPE)
            html {
                (head())
                body hx-ext="sse" class="bg-gray-900 min-h-screen flex flex-col items-center text-white" {
                    (nav)
                    (render_notifications())
                    main class="w-full flex flex-col items-center p-4" {
                        (markup)
                    }
                }
            }
        }
    }

    pub async fn get_connection(&self) -> SchoolResult<PoolConnection<Postgres>> {
        self.pool
            .acquire()
            .await
            .context(GetDatabaseConnectionSnafu)
    }

    pub async fn get_transaction(&self) -> SchoolResult<Transaction<'static, Postgres>> {
        self.pool.begin().await.context(GetDatabaseConnectionSnafu)
    }

    pub const fn config(&self) -> &RuntimeConfiguration {
        &self.config
    }

    pub fn subscribe_to_sse_feed(&self) -> Receiver<SseEvent> {
        self.sse_events_sender.subscribe()
    }

    pub fn send_sse_event(&self, event: SseEvent) {
        //only errors when nobody is listening
        let _ = self.sse_events_sender.send(event);
    }
}

impl Deref for SchoolState {
    type Target = Pool<Postgres>;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_responses_are_swapped_in() {
        let head = head().into_string();
        assert!(head.contains(r#"<meta name="htmx-config""#));
        assert!(head.contains(
            "{&quot;code&quot;:&quot;[45]..&quot;,&quot;swap&quot;:true,&quot;error&quot;:true}"
        ));
    }
}
