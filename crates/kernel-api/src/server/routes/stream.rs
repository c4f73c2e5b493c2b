async fn stream_subscribe(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_socket(socket, state))
}

/// Socket writes happen only on the writer task draining the subscriber channel, so hub
/// broadcasts and echo replies share one ordered egress path.
async fn stream_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut source) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Frame>(SUBSCRIBER_BUFFER);

    let Registration { id: subscriber, mut closed } = match state.hub.register(tx.clone()).await {
        Ok(registration) => registration,
        Err(err) => {
            warn!(error = %err, "stream.register_failed");
            return;
        }
    };
    info!(subscriber, "stream.connected");

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame.to_string().into())).await.is_err() {
                return;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    let evicted = loop {
        tokio::select! {
            incoming = source.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let Some(reply) = echo_frame(text.as_str()) else {
                            continue;
                        };
                        if tx.try_send(reply).is_err() {
                            break false;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break false,
                    _ => {}
                }
            }
            _ = &mut closed => break true,
            _ = &mut writer => break false,
        }
    };

    if evicted {
        // Dropping the last sender lets the writer flush what it holds and send a close frame.
        drop(tx);
        if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
            writer.abort();
        }
        info!(subscriber, "stream.evicted");
    } else {
        state.hub.unregister(subscriber).await;
        writer.abort();
        info!(subscriber, "stream.disconnected");
    }
}

/// Echo envelope for client JSON. Anything that is not JSON gets no reply.
fn echo_frame(text: &str) -> Option<Frame> {
    let received: Value = serde_json::from_str(text).ok()?;
    let event = StreamEvent::echo(received, Utc::now());
    serde_json::to_string(&event).ok().map(Frame::from)
}
