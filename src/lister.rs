//! Cursor-based pagination over the message listing endpoint

use async_stream::stream;
use futures::stream::Stream;
use futures::StreamExt;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info};

use crate::client::MailClient;
use crate::error::Result;
use crate::models::MessageRef;

/// Boxed stream of listing pages
pub type PageStream<'a> = Pin<Box<dyn Stream<Item = Result<Vec<MessageRef>>> + Send + 'a>>;

/// Walks every page of a search query
pub struct MessageLister<'a, C: MailClient + ?Sized> {
    client: &'a C,
}

impl<'a, C: MailClient + ?Sized> MessageLister<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Lazy stream yielding one item per provider page, in provider order.
    ///
    /// The next page is only requested once the consumer polls for it. A
    /// failed call is yielded as the final item.
    pub fn pages(&self, query: &'a str) -> PageStream<'a> {
        let client = self.client;

        Box::pin(stream! {
            let mut page_token: Option<String> = None;
            let mut page_number = 0usize;

            loop {
                page_number += 1;
                match client.list_messages_page(query, page_token.take()).await {
                    Ok(page) => {
                        debug!(
                            page = page_number,
                            messages = page.messages.len(),
                            has_next = page.next_page_token.is_some(),
                            "Fetched listing page"
                        );
                        let next = page.next_page_token;
                        yield Ok(page.messages);

                        match next {
                            Some(token) if !token.is_empty() => page_token = Some(token),
                            _ => {
                                info!(pages = page_number, "Listing complete");
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        })
    }

    /// Drive [`pages`](Self::pages) to completion, awaiting `on_page` for
    /// each page before the next one is requested.
    pub async fn for_each_page<F, Fut>(&self, query: &'a str, mut on_page: F) -> Result<()>
    where
        F: FnMut(Vec<MessageRef>) -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut pages = self.pages(query);
        while let Some(page) = pages.next().await {
            on_page(page?).await;
        }
        Ok(())
    }
}
