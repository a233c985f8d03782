//! MCP tool definitions for Hark.

use super::protocol::Tool;
use serde_json::{json, Value};

fn tool(name: &str, description: &str, input_schema: Value) -> Tool {
    Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

fn job_name_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "job_name": {
                "type": "string",
                "description": "Batch job name, e.g. batches/abc123"
            }
        },
        "required": ["job_name"]
    })
}

/// Get all available tools.
pub fn get_tools() -> Vec<Tool> {
    vec![
        tool(
            "get_transcript",
            "Get the transcript of a YouTube video from its captions. \
             Results are cached, so asking again is free.",
            json!({
                "type": "object",
                "properties": {
                    "video_url_or_id": {
                        "type": "string",
                        "description": "YouTube URL or 11-character video ID"
                    },
                    "include_timestamps": {
                        "type": "boolean",
                        "description": "Prefix lines with [M:SS] timestamps",
                        "default": true
                    },
                    "use_cache": {
                        "type": "boolean",
                        "description": "Return a cached transcript when one exists",
                        "default": true
                    },
                    "format": {
                        "type": "string",
                        "enum": ["markdown", "json", "text", "srt", "vtt"],
                        "default": "markdown"
                    }
                },
                "required": ["video_url_or_id"]
            }),
        ),
        tool(
            "find_rss",
            "Find the RSS feed URL of a podcast by name.",
            json!({
                "type": "object",
                "properties": {
                    "podcast_name": {
                        "type": "string",
                        "description": "Name of the podcast"
                    }
                },
                "required": ["podcast_name"]
            }),
        ),
        tool(
            "transcribe_episode",
            "Transcribe one podcast episode from its direct audio URL. \
             Long episodes can take minutes; use create_batch_transcription for many.",
            json!({
                "type": "object",
                "properties": {
                    "audio_url": {
                        "type": "string",
                        "description": "Direct audio URL (mp3, m4a, ...)"
                    },
                    "episode_title": {
                        "type": "string",
                        "description": "Episode title"
                    },
                    "include_timestamps": {
                        "type": "boolean",
                        "default": true
                    },
                    "speaker_diarization": {
                        "type": "boolean",
                        "description": "Label who is speaking",
                        "default": true
                    },
                    "use_cache": {
                        "type": "boolean",
                        "default": true
                    },
                    "format": {
                        "type": "string",
                        "enum": ["markdown", "json", "text", "srt", "vtt"],
                        "default": "markdown"
                    }
                },
                "required": ["audio_url"]
            }),
        ),
        tool(
            "get_cached",
            "Read a cached transcript by its cache key (fingerprint).",
            json!({
                "type": "object",
                "properties": {
                    "cache_key": {
                        "type": "string",
                        "description": "64-character fingerprint from list_cache"
                    },
                    "include_timestamps": {
                        "type": "boolean",
                        "default": true
                    },
                    "format": {
                        "type": "string",
                        "enum": ["markdown", "json", "text", "srt", "vtt"],
                        "default": "markdown"
                    }
                },
                "required": ["cache_key"]
            }),
        ),
        tool(
            "list_cache",
            "List cached transcripts without their content.",
            json!({
                "type": "object",
                "properties": {
                    "limit": {
                        "type": "integer",
                        "description": "Maximum number of entries",
                        "default": 20
                    },
                    "sort": {
                        "type": "string",
                        "enum": ["created", "title", "duration"],
                        "default": "created"
                    }
                }
            }),
        ),
        tool(
            "create_batch_transcription",
            "Submit many podcast episodes as one batch job. Batch jobs are cheaper \
             but finish asynchronously, usually within hours.",
            json!({
                "type": "object",
                "properties": {
                    "episodes": {
                        "type": "array",
                        "description": "Episodes to transcribe",
                        "items": {
                            "type": "object",
                            "properties": {
                                "audio_url": { "type": "string" },
                                "title": { "type": "string" }
                            },
                            "required": ["audio_url"]
                        }
                    },
                    "batch_name": {
                        "type": "string",
                        "description": "Display name for the job"
                    },
                    "speaker_diarization": {
                        "type": "boolean",
                        "default": true
                    },
                    "wait_for_completion": {
                        "type": "boolean",
                        "description": "Block until the job finishes and store its results",
                        "default": false
                    }
                },
                "required": ["episodes"]
            }),
        ),
        tool(
            "check_batch_status",
            "Show the current state of a batch job.",
            job_name_schema(),
        ),
        tool(
            "wait_for_batch",
            "Wait until a batch job finishes. Giving up does not cancel the job.",
            json!({
                "type": "object",
                "properties": {
                    "job_name": {
                        "type": "string",
                        "description": "Batch job name"
                    },
                    "poll_interval": {
                        "type": "integer",
                        "description": "Seconds between status checks",
                        "default": 60
                    },
                    "max_wait": {
                        "type": "integer",
                        "description": "Give up after this many seconds"
                    }
                },
                "required": ["job_name"]
            }),
        ),
        tool(
            "get_batch_results",
            "Store the transcripts of a finished batch job in the cache and report \
             the outcome of every episode.",
            job_name_schema(),
        ),
        tool(
            "cancel_batch",
            "Cancel a running batch job. Cancelling a finished job changes nothing.",
            job_name_schema(),
        ),
        tool(
            "list_batch_jobs",
            "List recent batch jobs.",
            json!({
                "type": "object",
                "properties": {
                    "limit": {
                        "type": "integer",
                        "default": 10
                    }
                }
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_tool_names_are_unique_and_required_fields_exist() {
        let tools = get_tools();
        assert_eq!(tools.len(), 11);

        let names: HashSet<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names.len(), tools.len());

        for tool in &tools {
            let properties = &tool.input_schema["properties"];
            if let Some(required) = tool.input_schema["required"].as_array() {
                for field in required {
                    let field = field.as_str().unwrap();
                    assert!(properties.get(field).is_some(), "{} lacks {}", tool.name, field);
                }
            }
        }
    }
}
