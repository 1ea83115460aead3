use std::sync::Arc;

use futures_util::future;
use futures_util::stream::StreamExt;

use super::prompt::{format_context, render_prompt};
use crate::error::ChatError;
use crate::llm::{ChatModel, ChatStream};
use crate::search::Retriever;

/// Plain-text fragments of one answer. Finite and not restartable; an `Err`
/// item is always the last one.
pub type AnswerStream = ChatStream;

/// Answers questions about one loaded repository.
///
/// Every call re-runs retrieval and generation; nothing is cached and no
/// earlier question influences the next.
#[derive(Clone)]
pub struct AnswerPipeline {
    retriever: Arc<dyn Retriever>,
    model: Arc<dyn ChatModel>,
    temperature: f32,
}

impl AnswerPipeline {
    pub fn new(retriever: Arc<dyn Retriever>, model: Arc<dyn ChatModel>, temperature: f32) -> Self {
        Self {
            retriever,
            model,
            temperature,
        }
    }

    pub async fn answer(&self, question: &str) -> Result<AnswerStream, ChatError> {
        let chunks = self
            .retriever
            .retrieve(question)
            .await
            .map_err(ChatError::Generation)?;
        tracing::debug!("Retrieved {} chunks for question", chunks.len());

        let context = format_context(&chunks);
        let prompt = render_prompt(&context, question);

        let stream = self
            .model
            .stream(prompt, self.temperature)
            .await
            .map_err(ChatError::Generation)?;

        Ok(Box::pin(stop_after_error(stream)))
    }
}

fn stop_after_error(
    stream: ChatStream,
) -> impl futures_util::Stream<Item = anyhow::Result<String>> + Send {
    stream.scan(false, |failed, item| {
        if *failed {
            return future::ready(None);
        }
        *failed = item.is_err();
        future::ready(Some(item))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;
    use crate::rag::REFUSAL;
    use anyhow::Result;
    use async_trait::async_trait;
    use futures_util::stream;
    use parking_lot::Mutex;

    struct StaticRetriever(Vec<Chunk>);

    #[async_trait]
    impl Retriever for StaticRetriever {
        async fn retrieve(&self, _query: &str) -> Result<Vec<Chunk>> {
            Ok(self.0.clone())
        }
    }

    /// Records the prompt and replays fixed items.
    struct ScriptedModel {
        items: Vec<Result<String, String>>,
        seen: Mutex<Vec<(String, f32)>>,
    }

    impl ScriptedModel {
        fn new(items: Vec<Result<String, String>>) -> Self {
            Self {
                items,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn stream(&self, prompt: String, temperature: f32) -> Result<ChatStream> {
            self.seen.lock().push((prompt, temperature));
            let items: Vec<Result<String>> = self
                .items
                .iter()
                .cloned()
                .map(|i| i.map_err(|e| anyhow::anyhow!(e)))
                .collect();
            Ok(Box::pin(stream::iter(items)))
        }
    }

    fn chunk(content: &str) -> Chunk {
        Chunk {
            file_path: "a.py".into(),
            chunk_index: 0,
            content: content.into(),
        }
    }

    #[tokio::test]
    async fn test_answer_streams_model_output() {
        let model = Arc::new(ScriptedModel::new(vec![Ok("Hel".into()), Ok("lo".into())]));
        let pipeline = AnswerPipeline::new(
            Arc::new(StaticRetriever(vec![chunk("c1"), chunk("c2")])),
            model.clone(),
            0.3,
        );

        let parts: Vec<String> = pipeline
            .answer("hi?")
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(parts.concat(), "Hello");

        let seen = model.seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].0.contains("c1\n\nc2"));
        assert!(seen[0].0.contains("Question:\nhi?"));
        assert!((seen[0].1 - 0.3).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_stream_ends_after_first_error() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok("partial".into()),
            Err("upstream 500".into()),
            Ok("never".into()),
        ]));
        let pipeline = AnswerPipeline::new(Arc::new(StaticRetriever(vec![])), model, 0.3);

        let items: Vec<Result<String>> = pipeline.answer("q").await.unwrap().collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "partial");
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn test_empty_context_still_prompts_with_refusal_instruction() {
        let model = Arc::new(ScriptedModel::new(vec![Ok(REFUSAL.into())]));
        let pipeline = AnswerPipeline::new(Arc::new(StaticRetriever(vec![])), model.clone(), 0.3);
        let parts: Vec<String> = pipeline
            .answer("What is the weather?")
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(parts.concat(), REFUSAL);
        assert!(model.seen.lock()[0].0.contains("Context:\n\n"));
    }

    #[tokio::test]
    async fn test_retrieval_failure_is_generation_error() {
        struct BrokenRetriever;

        #[async_trait]
        impl Retriever for BrokenRetriever {
            async fn retrieve(&self, _query: &str) -> Result<Vec<Chunk>> {
                anyhow::bail!("embedding service unavailable")
            }
        }

        let model = Arc::new(ScriptedModel::new(vec![]));
        let pipeline = AnswerPipeline::new(Arc::new(BrokenRetriever), model.clone(), 0.3);
        let err = pipeline.answer("q").await.err().unwrap();
        assert!(matches!(err, ChatError::Generation(_)));
        assert!(model.seen.lock().is_empty());
    }
}
