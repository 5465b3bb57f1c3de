//! Local web UI gateway.
//!
//! Serves a minimal embedded single-page shell from a raw TCP accept loop.
//! The shell holds no view logic: its script forwards DOM events to the
//! gateway's routes and injects the HTML fragments the controller renders,
//! with one delegated listener per stable container (never per rendered
//! child). The upstream history stream is relayed to the page over SSE and
//! attached exactly once per session, on the first `/events` subscription.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use colored::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};

use crate::protocol::{Message, MessageId, Profile};
use crate::render;
use crate::state::ChatKey;
use crate::Controller;

/// Embedded single-page shell. Styling is deliberately minimal — the shell
/// exists to host fragments, not to be a design system.
pub const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Mingle</title>
<style>
*{margin:0;padding:0;box-sizing:border-box}
body{font-family:system-ui,sans-serif;background:#f7fafc;color:#2d3748;display:flex;flex-direction:column;min-height:100vh}
header{padding:12px 20px;background:#fff;border-bottom:1px solid #e2e8f0;display:flex;gap:8px;align-items:center;position:relative}
.nav-tab{border:1px solid #e2e8f0;background:#fff;border-radius:6px;padding:6px 14px;cursor:pointer}
.nav-tab.active{background:#4a5568;color:#fff}
#add-topic-dropdown{display:none;position:absolute;top:48px;left:20px;background:#fff;border:1px solid #e2e8f0;border-radius:6px;padding:6px;z-index:10}
.add-topic-item{display:block;width:100%;text-align:left;border:none;background:none;padding:6px 12px;cursor:pointer}
.add-topic-item:hover{background:#edf2f7}
main{flex:1;display:flex;gap:16px;padding:16px 20px}
#chat-col{flex:2;display:flex;flex-direction:column;gap:10px}
#chat-messages{background:#fff;border:1px solid #e2e8f0;border-radius:8px;padding:14px;flex:1;overflow-y:auto}
.chat-msg{margin-bottom:10px}
.speaker{font-weight:700;margin-right:8px}
.time{font-size:.72rem;color:#a0aec0}
.msg-reactions{margin-top:2px}
.msg-reaction{margin-right:6px;font-size:.85rem}
.msg-reaction-add{border:none;background:none;cursor:pointer;opacity:.55}
.msg-reaction-add:hover{opacity:1}
.empty-msg{color:#718096}
#human-input-area{display:flex;gap:8px}
#human-text{flex:1;padding:8px;border:1px solid #e2e8f0;border-radius:6px}
#match-detail-view{display:none;background:#fff;border:1px solid #e2e8f0;border-radius:8px;padding:14px;flex:1}
#matches-col{flex:1}
.match-card{background:#fff;border:1px solid #e2e8f0;border-radius:8px;padding:10px;margin-bottom:8px;cursor:pointer}
.match-card.active{border-color:#4a5568}
.score-badge{background:#ebf8ff;border-radius:10px;padding:2px 8px;font-size:.8rem}
button{cursor:pointer}
#profile-section{padding:16px 20px;border-top:1px solid #e2e8f0;background:#fff}
#profile-form input{margin:4px 6px 4px 0;padding:6px;border:1px solid #e2e8f0;border-radius:6px}
.voice-q-block{margin:10px 0;padding:10px;border:1px solid #e2e8f0;border-radius:8px}
.status-msg{margin-left:10px;color:#718096}
.status-msg.error{color:#c53030}
.status-msg.success{color:#2f855a}
</style>
</head>
<body>
<header>
  <div id="tab-bar"></div>
  <button type="button" class="nav-tab" id="tab-add">+</button>
  <div id="add-topic-dropdown"><div id="add-topic-list"></div></div>
</header>
<main>
  <div id="chat-col">
    <div id="chat-messages">Loading…</div>
    <div id="match-detail-view"></div>
    <form id="human-input-area">
      <input type="text" id="human-text" placeholder="Say something…" autocomplete="off">
      <button type="submit">Send</button>
      <button type="button" id="human-clear">Clear</button>
    </form>
  </div>
  <div id="matches-col">
    <h3>Matches</h3>
    <div id="matches-list">Loading…</div>
  </div>
</main>
<div id="profile-section">
  <h3>Profile &amp; voice onboarding</h3>
  <form id="profile-form">
    <input name="fullName" placeholder="Full name" required>
    <input name="email" placeholder="Email" required>
    <input name="location" placeholder="Location">
    <input name="jobTitle" placeholder="Job title">
    <input name="company" placeholder="Company">
    <input name="skills" placeholder="Skills (comma separated)">
    <input name="interests" placeholder="Interests (comma separated)">
    <button type="submit">Save profile</button>
    <span id="profile-status" class="status-msg"></span>
  </form>
  <div id="voice-questions"></div>
  <button type="button" id="create-persona-btn">Create persona</button>
  <span id="create-persona-status" class="status-msg"></span>
</div>
<script>
const $=s=>document.querySelector(s);
let viewMode='chat';
let activeChat='human';

async function getFrag(url){
  const r=await fetch(url);
  if(!r.ok)throw new Error(r.statusText);
  return r.text();
}
async function postJson(url,body){
  const r=await fetch(url,{method:'POST',headers:{'Content-Type':'application/json'},body:JSON.stringify(body||{})});
  const data=await r.json().catch(()=>({}));
  if(!r.ok)throw new Error(data.error||r.statusText);
  if(data.error)throw new Error(data.error);
  return data;
}

function showChat(){
  viewMode='chat';
  $('#match-detail-view').style.display='none';
  $('#chat-messages').style.display='block';
}
function setInputVisibility(key){
  $('#human-input-area').style.display=key==='human'?'flex':'none';
}

async function refreshTabs(){
  $('#tab-bar').innerHTML=await getFrag('/view/tabs');
  $('#add-topic-list').innerHTML=await getFrag('/view/topic-menu');
}
async function selectChat(key){
  activeChat=key;
  showChat();
  setInputVisibility(key);
  $('#chat-messages').innerHTML='Loading…';
  $('#chat-messages').innerHTML=await getFrag('/view/conversation?chat='+encodeURIComponent(key));
  refreshTabs();
}

/* Delegated listeners: bound once on stable containers. */
$('#tab-bar').addEventListener('click',e=>{
  const tab=e.target.closest('.nav-tab');
  if(tab)selectChat(tab.dataset.chat);
});
$('#tab-add').addEventListener('click',e=>{
  e.stopPropagation();
  const dd=$('#add-topic-dropdown');
  dd.style.display=dd.style.display==='block'?'none':'block';
});
document.addEventListener('click',()=>{$('#add-topic-dropdown').style.display='none'});
$('#add-topic-dropdown').addEventListener('click',e=>e.stopPropagation());
$('#add-topic-list').addEventListener('click',async e=>{
  const item=e.target.closest('.add-topic-item');
  if(!item)return;
  $('#add-topic-dropdown').style.display='none';
  const data=await postJson('/action/add-topic',{topic:item.dataset.topic}).catch(()=>null);
  if(data&&data.fragment!==undefined){
    activeChat=data.chat;
    showChat();
    setInputVisibility(activeChat);
    $('#chat-messages').innerHTML=data.fragment;
    refreshTabs();
  }
});

$('#chat-messages').addEventListener('click',async e=>{
  if(e.target.id==='btn-generate-general'){
    e.target.disabled=true;
    e.target.textContent='Generating…';
    $('#chat-messages').innerHTML=await getFrag('/view/generating');
    const data=await postJson('/action/generate').catch(err=>({fragment:'<p class="empty-msg">Error: '+err.message+'</p>'}));
    $('#chat-messages').innerHTML=data.fragment;
    return;
  }
  const btn=e.target.closest('.msg-reaction-add');
  if(btn){
    const raw=btn.dataset.msgId,n=Number(raw);
    try{
      const data=await postJson('/action/react',{message_id:Number.isNaN(n)?raw:n,emoji:btn.dataset.emoji});
      $('#chat-messages').innerHTML=data.fragment;
    }catch(err){alert(err.message)}
  }
});

$('#human-input-area').addEventListener('submit',async e=>{
  e.preventDefault();
  const text=$('#human-text').value.trim();
  if(!text)return;
  try{
    const data=await postJson('/action/send',{text});
    $('#human-text').value='';
    $('#chat-messages').innerHTML=data.fragment;
  }catch(err){alert(err.message)}
});
$('#human-clear').addEventListener('click',async()=>{
  if(!confirm('Clear all human chat messages?'))return;
  try{
    const data=await postJson('/action/clear');
    $('#chat-messages').innerHTML=data.fragment;
  }catch(err){alert(err.message)}
});

$('#matches-list').addEventListener('click',async e=>{
  const card=e.target.closest('.match-card');
  if(!card)return;
  const data=await postJson('/action/select-match',{index:parseInt(card.dataset.matchIndex,10)}).catch(()=>null);
  if(!data)return;
  $('#matches-list').innerHTML=data.cards;
  $('#match-detail-view').innerHTML=data.detail;
  viewMode='match';
  $('#chat-messages').style.display='none';
  $('#human-input-area').style.display='none';
  $('#match-detail-view').style.display='block';
});

$('#match-detail-view').addEventListener('click',async e=>{
  if(e.target.id==='btn-back-chat'){
    const data=await postJson('/action/back').catch(()=>({fragment:''}));
    activeChat='human';
    showChat();
    setInputVisibility('human');
    $('#chat-messages').innerHTML=data.fragment;
    refreshTabs();
  }else if(e.target.id==='btn-view-profile'){
    try{
      const data=await postJson('/action/view-profile');
      $('#match-detail-view').querySelector('.match-detail-card').insertAdjacentHTML('beforeend',data.fragment);
    }catch(err){alert(err.message)}
  }else if(e.target.id==='btn-send-request'){
    try{
      const data=await postJson('/action/connect');
      alert('Connection request sent to '+data.to+'!');
    }catch(err){alert(err.message)}
  }
});

/* Profile + voice onboarding */
$('#profile-form').addEventListener('submit',async e=>{
  e.preventDefault();
  const fd=new FormData(e.target);
  const split=v=>(v||'').split(',').map(s=>s.trim()).filter(Boolean);
  const profile={
    profile:{fullName:fd.get('fullName')||'',email:fd.get('email')||'',location:fd.get('location')||''},
    professional:{jobTitle:fd.get('jobTitle')||'',company:fd.get('company')||'',skills:split(fd.get('skills'))},
    interests:split(fd.get('interests')),
    weekend:'',socialEnergy:'',communicationStyle:'',seeking:''
  };
  const status=$('#profile-status');
  try{
    await postJson('/action/profile',profile);
    status.textContent='Profile saved.';
    status.className='status-msg success';
    $('#voice-questions').innerHTML=await getFrag('/view/questions');
  }catch(err){
    status.textContent='Could not save profile: '+err.message;
    status.className='status-msg error';
  }
});

$('#voice-questions').addEventListener('click',async e=>{
  const rec=e.target.closest('.btn-record');
  const stop=e.target.closest('.btn-stop');
  if(!rec&&!stop)return;
  const index=parseInt((rec||stop).dataset.index,10);
  await postJson(rec?'/voice/start':'/voice/stop',{index}).catch(()=>null);
  $('#voice-questions').innerHTML=await getFrag('/view/voice-rows');
});

$('#create-persona-btn').addEventListener('click',async e=>{
  const btn=e.target,status=$('#create-persona-status');
  btn.disabled=true;
  status.textContent='Creating your persona…';
  status.className='status-msg';
  try{
    await postJson('/action/create-persona');
    status.textContent='Persona created! Redirecting…';
    status.className='status-msg success';
    setTimeout(()=>{window.location.href='/'},1200);
  }catch(err){
    status.textContent='Error: '+err.message;
    status.className='status-msg error';
    btn.disabled=false;
  }
});

/* Initial load, then attach the live history stream exactly once. */
(async()=>{
  await refreshTabs();
  await selectChat('human');
  $('#matches-list').innerHTML=await getFrag('/view/matches').catch(()=>'');
  const es=new EventSource('/events');
  es.onmessage=e=>{
    if(viewMode!=='chat'||activeChat!=='human')return;
    try{
      const ev=JSON.parse(e.data);
      if(!ev.fragment)return;
      const empty=$('#chat-messages').querySelector('.empty-msg');
      if(empty)empty.remove();
      $('#chat-messages').insertAdjacentHTML('beforeend',ev.fragment);
      $('#chat-messages').scrollTop=$('#chat-messages').scrollHeight;
    }catch(err){}
  };
  es.onerror=()=>es.close();
})();
</script>
</body>
</html>"##;

/// Simple percent-decoding for URL query parameters.
pub fn url_decode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '+' => out.push(' '),
            '%' => {
                let hex: String = chars.by_ref().take(2).collect();
                if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                    out.push(byte as char);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Parse a query string into key-value pairs.
pub fn parse_query(query: &str) -> std::collections::HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?;
            let value = parts.next().unwrap_or("");
            Some((key.to_string(), url_decode(value)))
        })
        .collect()
}

/// One parsed HTTP request: method, path, query string and body.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub query: String,
    pub body: String,
}

/// Parse the request head (and however much of the body arrived with it)
/// from raw bytes. Returns `None` for anything that is not plausible HTTP.
pub fn parse_request(raw: &str) -> Option<Request> {
    let first_line = raw.lines().next()?;
    let mut parts = first_line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?;

    let (path, query) = match target.find('?') {
        Some(idx) => (&target[..idx], &target[idx + 1..]),
        None => (target, ""),
    };

    let body = raw
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();

    Some(Request {
        method,
        path: path.to_string(),
        query: query.to_string(),
        body,
    })
}

/// Declared body length, when the request carries one.
pub fn content_length(raw: &str) -> usize {
    raw.lines()
        .take_while(|line| !line.is_empty())
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse().ok()
            } else {
                None
            }
        })
        .unwrap_or(0)
}

fn html_response(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
}

fn json_response(value: &serde_json::Value) -> String {
    let body = value.to_string();
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
}

fn error_response(message: &str) -> String {
    let body = serde_json::json!({ "error": message }).to_string();
    format!(
        "HTTP/1.1 502 Bad Gateway\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
}

fn not_found_response() -> String {
    "HTTP/1.1 404 Not Found\r\nContent-Length: 9\r\nConnection: close\r\n\r\nNot Found".to_string()
}

#[derive(Clone)]
struct Gateway {
    controller: Arc<Mutex<Controller>>,
    feed: broadcast::Sender<Message>,
    stream_attached: Arc<AtomicBool>,
}

/// Start the web UI gateway and optionally open the browser.
pub async fn serve(
    controller: Controller,
    port: u16,
    open_browser: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", port)).await?;

    eprintln!(
        "{}",
        format!("  Mingle UI running at http://localhost:{}", port).bright_green()
    );
    eprintln!("{}", "  Press Ctrl+C to stop.".bright_blue());

    if open_browser {
        #[cfg(target_os = "windows")]
        {
            let _ = std::process::Command::new("cmd")
                .args(["/C", &format!("start http://localhost:{}", port)])
                .spawn();
        }
        #[cfg(target_os = "macos")]
        {
            let _ = std::process::Command::new("open")
                .arg(format!("http://localhost:{}", port))
                .spawn();
        }
        #[cfg(target_os = "linux")]
        {
            let _ = std::process::Command::new("xdg-open")
                .arg(format!("http://localhost:{}", port))
                .spawn();
        }
    }

    let (feed, _) = broadcast::channel(256);
    let gateway = Gateway {
        controller: Arc::new(Mutex::new(controller)),
        feed,
        stream_attached: Arc::new(AtomicBool::new(false)),
    };

    loop {
        let (stream, _addr) = listener.accept().await?;
        let gateway = gateway.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, gateway).await {
                tracing::debug!(error = %e, "connection error");
            }
        });
    }
}

async fn read_request(stream: &mut TcpStream) -> std::io::Result<Option<Request>> {
    let mut raw = Vec::with_capacity(2048);
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&buf[..n]);
        let text = String::from_utf8_lossy(&raw);
        if let Some(head_end) = text.find("\r\n\r\n") {
            let expected = content_length(&text[..head_end]);
            let have = raw.len() - head_end - 4;
            if have >= expected {
                break;
            }
        }
        if raw.len() > 1 << 20 {
            // No shell route sends anywhere near a megabyte.
            break;
        }
    }
    Ok(parse_request(&String::from_utf8_lossy(&raw)))
}

async fn handle_connection(
    mut stream: TcpStream,
    gateway: Gateway,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let Some(request) = read_request(&mut stream).await? else {
        return Ok(());
    };

    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/") => {
            stream
                .write_all(html_response(INDEX_HTML).as_bytes())
                .await?;
        }
        ("GET", "/events") => {
            serve_events(stream, gateway).await;
        }
        _ => {
            let response = route(&request, &gateway).await;
            stream.write_all(response.as_bytes()).await?;
        }
    }
    Ok(())
}

/// All fragment and action routes. Each holds the controller only for the
/// duration of its own work; the page stays interactive between requests.
async fn route(request: &Request, gateway: &Gateway) -> String {
    let params = parse_query(&request.query);
    let mut controller = gateway.controller.lock().await;

    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/view/tabs") => {
            let state = controller.state().clone();
            html_response(&render::render_tabs(&state.added_tabs, &state.active_chat))
        }
        ("GET", "/view/topic-menu") => {
            html_response(&render::render_topic_menu(&controller.state().added_tabs))
        }
        ("GET", "/view/conversation") => {
            let key = ChatKey::parse(params.get("chat").map(|s| s.as_str()).unwrap_or("human"));
            html_response(&controller.select_tab(key).await)
        }
        ("GET", "/view/matches") => html_response(&controller.matches_fragment().await),
        ("GET", "/view/generating") => html_response(&render::render_generating_notice()),
        ("GET", "/view/questions") => {
            if controller.voice_rows().is_empty() {
                if let Err(e) = controller.load_questions().await {
                    tracing::debug!(error = %e, "question load failed");
                    return html_response(
                        "<p class=\"status-msg error\">Could not load questions. You can still create your persona from your profile.</p>",
                    );
                }
            }
            html_response(&render::render_voice_questions(controller.voice_rows()))
        }
        ("GET", "/view/voice-rows") => {
            html_response(&render::render_voice_questions(controller.voice_rows()))
        }
        ("POST", "/action/add-topic") => {
            let topic = json_field(&request.body, "topic").unwrap_or_default();
            match controller.add_topic(&topic).await {
                Some(fragment) => json_response(&serde_json::json!({
                    "chat": topic.to_lowercase(),
                    "fragment": fragment,
                })),
                None => json_response(&serde_json::json!({})),
            }
        }
        ("POST", "/action/send") => {
            let text = json_field(&request.body, "text").unwrap_or_default();
            match controller.send_human(text.trim()).await {
                Ok(fragment) => json_response(&serde_json::json!({ "fragment": fragment })),
                Err(e) => error_response(&e.to_string()),
            }
        }
        ("POST", "/action/clear") => match controller.clear_human().await {
            Ok(fragment) => json_response(&serde_json::json!({ "fragment": fragment })),
            Err(e) => error_response(&e.to_string()),
        },
        ("POST", "/action/react") => {
            let Ok(payload) = serde_json::from_str::<serde_json::Value>(&request.body) else {
                return error_response("malformed reaction");
            };
            let emoji = payload["emoji"].as_str().unwrap_or_default().to_string();
            let message_id = match &payload["message_id"] {
                serde_json::Value::Number(n) => MessageId::Num(n.as_i64().unwrap_or_default()),
                serde_json::Value::String(s) => MessageId::Text(s.clone()),
                _ => return error_response("malformed reaction"),
            };
            match controller.react(message_id, &emoji).await {
                Ok(fragment) => json_response(&serde_json::json!({ "fragment": fragment })),
                Err(e) => error_response(&e.to_string()),
            }
        }
        ("POST", "/action/generate") => {
            let turns = params
                .get("turns")
                .and_then(|t| t.parse().ok())
                .unwrap_or(10);
            let fragment = controller.generate_general(turns).await;
            json_response(&serde_json::json!({ "fragment": fragment }))
        }
        ("POST", "/action/select-match") => {
            let index = json_index(&request.body);
            match controller.select_match(index).await {
                Some((cards, detail)) => {
                    json_response(&serde_json::json!({ "cards": cards, "detail": detail }))
                }
                None => error_response("match no longer listed"),
            }
        }
        ("POST", "/action/back") => {
            let fragment = controller.back_to_chat().await;
            json_response(&serde_json::json!({ "fragment": fragment }))
        }
        ("POST", "/action/view-profile") => {
            let Some(index) = controller.state().selected_match else {
                return error_response("no match selected");
            };
            match controller.view_profile(index).await {
                Ok(lookup) => match crate::profile_outcome(lookup) {
                    Ok(fragment) => json_response(&serde_json::json!({ "fragment": fragment })),
                    Err(alert) => error_response(&alert),
                },
                Err(e) => error_response(&e.to_string()),
            }
        }
        ("POST", "/action/connect") => {
            let Some(index) = controller.state().selected_match else {
                return error_response("no match selected");
            };
            match controller.send_connection_request(index).await {
                Ok(to) => json_response(&serde_json::json!({ "to": to })),
                Err(e) => error_response(&e.to_string()),
            }
        }
        ("POST", "/action/profile") => {
            let Ok(profile) = serde_json::from_str::<Profile>(&request.body) else {
                return error_response("malformed profile");
            };
            match controller.save_profile(profile).await {
                Ok(()) => json_response(&serde_json::json!({ "ok": true })),
                Err(e) => error_response(&e.to_string()),
            }
        }
        ("POST", "/voice/start") => {
            let index = json_index(&request.body);
            match controller.start_recording(index).await {
                Ok(()) => json_response(&serde_json::json!({ "ok": true })),
                Err(e) => error_response(&e.to_string()),
            }
        }
        ("POST", "/voice/stop") => {
            let index = json_index(&request.body);
            match controller.stop_recording(index).await {
                Ok(text) => json_response(&serde_json::json!({ "text": text })),
                Err(e) => error_response(&e.to_string()),
            }
        }
        ("POST", "/action/create-persona") => match controller.create_persona().await {
            Ok(()) => json_response(&serde_json::json!({ "ok": true })),
            Err(e) => error_response(&e.to_string()),
        },
        _ => not_found_response(),
    }
}

fn json_field(body: &str, field: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()?
        .get(field)?
        .as_str()
        .map(|s| s.to_string())
}

fn json_index(body: &str) -> usize {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("index").and_then(|i| i.as_u64()))
        .unwrap_or(u64::MAX) as usize
}

/// Relay the upstream history stream to one page as SSE. The upstream
/// channel is attached on the first subscription and shared by every
/// later one through the broadcast feed.
async fn serve_events(mut stream: TcpStream, gateway: Gateway) {
    let client_id = uuid::Uuid::new_v4();
    tracing::info!(%client_id, "events subscriber attached");

    if !gateway.stream_attached.swap(true, Ordering::SeqCst) {
        let rx = gateway.controller.lock().await.start_history_stream();
        let feed = gateway.feed.clone();
        tokio::spawn(async move {
            use futures_util::StreamExt;
            let mut messages = tokio_stream::wrappers::UnboundedReceiverStream::new(rx);
            while let Some(message) = messages.next().await {
                let _ = feed.send(message);
            }
        });
    }

    let headers = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\nConnection: keep-alive\r\n\r\n";
    if stream.write_all(headers.as_bytes()).await.is_err() {
        return;
    }

    let mut feed = gateway.feed.subscribe();
    loop {
        match feed.recv().await {
            Ok(message) => {
                let fragment = render::render_messages(std::slice::from_ref(&message), false);
                let event = serde_json::json!({ "fragment": fragment });
                let sse = format!("data: {}\n\n", event);
                if stream.write_all(sse.as_bytes()).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(%client_id, skipped, "events subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    tracing::info!(%client_id, "events subscriber detached");
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- url_decode / parse_query --

    #[test]
    fn test_url_decode_basic() {
        assert_eq!(url_decode("hello+world"), "hello world");
        assert_eq!(url_decode("hello%20world"), "hello world");
        assert_eq!(url_decode("a%26b"), "a&b");
        assert_eq!(url_decode("plain"), "plain");
    }

    #[test]
    fn test_parse_query_pairs() {
        let params = parse_query("chat=books&x=1");
        assert_eq!(params.get("chat").map(|s| s.as_str()), Some("books"));
        assert_eq!(params.get("x").map(|s| s.as_str()), Some("1"));
    }

    #[test]
    fn test_parse_query_missing_value() {
        let params = parse_query("flag");
        assert_eq!(params.get("flag").map(|s| s.as_str()), Some(""));
    }

    // -- request parsing --

    #[test]
    fn test_parse_request_get_with_query() {
        let raw = "GET /view/conversation?chat=human HTTP/1.1\r\nHost: x\r\n\r\n";
        let req = parse_request(raw).expect("request");
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/view/conversation");
        assert_eq!(req.query, "chat=human");
        assert!(req.body.is_empty());
    }

    #[test]
    fn test_parse_request_post_with_body() {
        let raw = "POST /action/send HTTP/1.1\r\nContent-Length: 16\r\n\r\n{\"text\":\"hello\"}";
        let req = parse_request(raw).expect("request");
        assert_eq!(req.method, "POST");
        assert_eq!(req.body, "{\"text\":\"hello\"}");
    }

    #[test]
    fn test_parse_request_garbage_is_none() {
        assert!(parse_request("").is_none());
    }

    #[test]
    fn test_content_length_case_insensitive() {
        let raw = "POST /x HTTP/1.1\r\ncontent-length: 42\r\n\r\n";
        assert_eq!(content_length(raw), 42);
    }

    #[test]
    fn test_content_length_missing_is_zero() {
        assert_eq!(content_length("GET / HTTP/1.1\r\nHost: x\r\n\r\n"), 0);
    }

    // -- body helpers --

    #[test]
    fn test_json_field_extracts_string() {
        assert_eq!(
            json_field(r#"{"topic":"Books"}"#, "topic").as_deref(),
            Some("Books")
        );
        assert!(json_field(r#"{"topic":7}"#, "topic").is_none());
        assert!(json_field("not json", "topic").is_none());
    }

    #[test]
    fn test_json_index_parses() {
        assert_eq!(json_index(r#"{"index":3}"#), 3);
    }

    #[test]
    fn test_json_index_garbage_is_out_of_range() {
        assert_eq!(json_index("{}"), u64::MAX as usize);
    }

    // -- response formatting --

    #[test]
    fn test_html_response_has_content_length() {
        let response = html_response("<p>x</p>");
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("Content-Length: 8"));
        assert!(response.ends_with("<p>x</p>"));
    }

    #[test]
    fn test_error_response_carries_message() {
        let response = error_response("Bad Gateway");
        assert!(response.starts_with("HTTP/1.1 502"));
        assert!(response.contains("\"error\":\"Bad Gateway\""));
    }

    // -- embedded shell sanity --

    #[test]
    fn test_index_html_has_stable_containers() {
        assert!(INDEX_HTML.contains("id=\"tab-bar\""));
        assert!(INDEX_HTML.contains("id=\"chat-messages\""));
        assert!(INDEX_HTML.contains("id=\"matches-list\""));
        assert!(INDEX_HTML.contains("id=\"match-detail-view\""));
        assert!(INDEX_HTML.contains("id=\"voice-questions\""));
    }

    #[test]
    fn test_index_html_uses_delegated_listeners() {
        // One listener per container; rendered children carry data-* only.
        assert!(INDEX_HTML.contains("closest('.nav-tab')"));
        assert!(INDEX_HTML.contains("closest('.msg-reaction-add')"));
        assert!(INDEX_HTML.contains("closest('.match-card')"));
        assert!(INDEX_HTML.contains("closest('.btn-record')"));
    }

    #[test]
    fn test_index_html_attaches_event_source_once() {
        assert_eq!(INDEX_HTML.matches("new EventSource").count(), 1);
        assert!(INDEX_HTML.contains("es.onerror=()=>es.close()"));
    }

    #[test]
    fn test_index_html_removes_empty_state_on_stream() {
        assert!(INDEX_HTML.contains("querySelector('.empty-msg')"));
    }

    #[test]
    fn test_index_html_confirms_before_clear() {
        assert!(INDEX_HTML.contains("confirm('Clear all human chat messages?')"));
    }

    #[test]
    fn test_index_html_no_external_deps() {
        assert!(!INDEX_HTML.contains("cdn."));
        assert!(!INDEX_HTML.contains("unpkg.com"));
        assert!(!INDEX_HTML.contains("jsdelivr"));
    }

    #[test]
    fn test_index_html_disables_create_button_in_flight() {
        assert!(INDEX_HTML.contains("btn.disabled=true"));
    }

    // -- server binding smoke test --

    #[tokio::test]
    async fn test_listener_binds_ephemeral_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await;
        assert!(listener.is_ok());
        assert!(listener.unwrap().local_addr().unwrap().port() > 0);
    }
}
