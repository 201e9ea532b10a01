// Operator page: ranked node table, script converter, test dispatch with a
// live log view over the SSE stream.

pub const PAGE: &str = r#"
<!doctype html>
<html lang="en" class="dark">
<head>
  <meta charset="utf-8" />
  <title>Perch Console</title>

  <!-- Tailwind (CDN) -->
  <script>
    tailwind.config = { darkMode: 'class' };
  </script>
  <script src="https://cdn.tailwindcss.com"></script>

  <!-- Alpine.js (CDN) -->
  <script defer src="https://unpkg.com/alpinejs@3.x.x/dist/cdn.min.js"></script>

  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <style>[x-cloak]{display:none!important}</style>
</head>
<body class="bg-slate-900 text-slate-100 antialiased">
  <main class="max-w-6xl mx-auto p-6 flex flex-col gap-6 h-dvh"
        x-data="perch()"
        x-init="init()">

    <div class="flex items-center justify-between">
      <h1 class="text-3xl font-bold tracking-tight shrink-0">Perch Console</h1>
      <button @click="loadNodes()"
              class="px-2 py-1 text-sm rounded-md bg-slate-700 text-slate-100 hover:bg-slate-600">
        Refresh nodes
      </button>
    </div>

    <!-- Nodes, best-first -->
    <div class="bg-slate-800 shadow-sm ring-1 ring-slate-700 rounded-xl p-4 shrink-0">
      <div class="text-sm font-semibold text-slate-300 mb-2">Runtime nodes (best-first)</div>
      <table class="min-w-full text-sm">
        <thead class="bg-slate-700">
          <tr class="text-left text-slate-100">
            <th class="px-3 py-2 font-medium">ID</th>
            <th class="px-3 py-2 font-medium">Name</th>
            <th class="px-3 py-2 font-medium">Status</th>
            <th class="px-3 py-2 font-medium">Region</th>
            <th class="px-3 py-2 font-medium">Latency</th>
            <th class="px-3 py-2 font-medium">Queue</th>
          </tr>
        </thead>
        <tbody>
          <template x-for="n in nodes" :key="n.id">
            <tr class="border-t border-slate-700 hover:bg-slate-700/50">
              <td class="px-3 py-2 tabular-nums" x-text="n.id"></td>
              <td class="px-3 py-2" x-text="n.name"></td>
              <td class="px-3 py-2">
                <span :class="n.status === 'online' ? 'text-emerald-400' : n.status === 'paused' ? 'text-amber-400' : 'text-rose-400'"
                      x-text="n.status"></span>
              </td>
              <td class="px-3 py-2" x-text="n.region ?? '-'"></td>
              <td class="px-3 py-2 tabular-nums" x-text="n.latency_ms != null ? n.latency_ms + ' ms' : '-'"></td>
              <td class="px-3 py-2 tabular-nums" x-text="n.queue_size"></td>
            </tr>
          </template>
        </tbody>
      </table>
    </div>

    <!-- Convert + dispatch -->
    <div class="bg-slate-800 shadow-sm ring-1 ring-slate-700 rounded-xl p-4 space-y-3 shrink-0">
      <div class="grid grid-cols-1 md:grid-cols-4 gap-3 items-center">
        <label class="text-sm font-medium text-slate-300">Target URL</label>
        <input x-model="url" type="text"
               class="md:col-span-3 w-full rounded-lg border-slate-700 bg-slate-900 text-slate-100 px-2 py-1.5 text-sm"
               placeholder="https://...">

        <label class="text-sm font-medium text-slate-300">Dialect</label>
        <select x-model="dialect"
                class="rounded-lg border-slate-700 bg-slate-900 text-slate-100 px-2 py-1.5 text-sm">
          <option value="javascript">javascript</option>
          <option value="python">python</option>
        </select>
        <div class="md:col-span-2 text-sm text-slate-400" x-text="report"></div>
      </div>

      <textarea x-model="script" rows="5"
                class="w-full rounded-lg border-slate-700 bg-slate-900 text-slate-100 px-2 py-1.5 text-sm font-mono"
                placeholder="await page.goto('https://example.com')"></textarea>

      <div class="flex items-center gap-3">
        <button @click="convert()"
                class="px-2 py-1 text-sm rounded-md bg-slate-700 text-slate-100 font-medium hover:bg-slate-600">
          Convert
        </button>
        <button @click="startTest()"
                :disabled="isRunning"
                class="px-2 py-1 text-sm rounded-md bg-indigo-600 text-white font-medium hover:bg-indigo-700 disabled:opacity-50 disabled:cursor-not-allowed">
          <span x-text="isRunning ? 'Running…' : 'Start test crawl'"></span>
        </button>
        <button @click="startSteps()"
                :disabled="isRunning || !script"
                class="px-2 py-1 text-sm rounded-md bg-indigo-600 text-white font-medium hover:bg-indigo-700 disabled:opacity-50 disabled:cursor-not-allowed">
          Replay steps
        </button>
      </div>
    </div>

    <!-- Job log -->
    <div class="bg-slate-800 shadow-sm ring-1 ring-slate-700 rounded-xl p-4 flex-1 min-h-0 flex flex-col">
      <div class="flex items-center justify-between mb-2">
        <div class="text-sm font-semibold text-slate-300">Job log</div>
        <div class="text-sm text-slate-300" x-text="jobId ? 'job ' + jobId : 'no job yet'"></div>
      </div>
      <pre id="log"
           class="flex-1 min-h-0 overflow-auto whitespace-pre-wrap text-sm leading-relaxed text-slate-200 bg-slate-900/40 rounded-md p-2"
           x-text="logs.join('\n')"></pre>
    </div>
  </main>

  <script>
    function perch() {
      return {
        url: 'https://example.com',
        dialect: 'javascript',
        script: '',
        report: '',
        nodes: [],
        jobId: null,
        logs: [],
        isRunning: false,
        _es: null,

        init() { this.loadNodes(); },
        log(msg) {
          this.logs.push(msg);
          this.$nextTick(() => {
            const el = document.getElementById('log');
            if (el) el.scrollTop = el.scrollHeight;
          });
        },

        async loadNodes() {
          const rsp = await fetch('/nodes');
          if (rsp.ok) { this.nodes = (await rsp.json()).nodes; }
        },

        async convert() {
          const rsp = await fetch('/convert', {
            method: 'POST',
            headers: { 'Content-Type': 'application/json' },
            body: JSON.stringify({ script: this.script, dialect: this.dialect }),
          });
          const data = await rsp.json();
          this.report = `matched ${data.report.matched_lines}, skipped ${data.report.skipped_lines}`;
        },

        startTest() {
          this.dispatch('/jobs/test', { url: this.url });
        },
        startSteps() {
          this.dispatch('/jobs/steps', { url: this.url, script: this.script, dialect: this.dialect });
        },

        async dispatch(endpoint, body) {
          const rsp = await fetch(endpoint, {
            method: 'POST',
            headers: { 'Content-Type': 'application/json' },
            body: JSON.stringify(body),
          });
          const data = await rsp.json();
          if (!rsp.ok) { this.log(`ERROR: ${data.error || rsp.status}`); return; }
          this.follow(data.job_id, data.node_id);
        },

        follow(jobId, nodeId) {
          if (this._es) { try { this._es.close(); } catch (_) {} this._es = null; }
          this.jobId = jobId;
          this.logs = [];
          this.isRunning = true;
          this.log(`dispatched to node ${nodeId}`);

          const es = new EventSource(`/jobs/${jobId}/stream`);
          this._es = es;

          es.addEventListener('start', (ev) => this.log(`START: ${ev.data}`));
          es.addEventListener('log', (ev) => {
            const row = JSON.parse(ev.data || '{}');
            this.log(`[${row.level}] ${row.message}`);
          });
          es.addEventListener('artifact', (ev) => this.log(`ARTIFACT: ${ev.data}`));
          es.addEventListener('result', (ev) => this.log(`RESULT: ${ev.data}`));
          es.addEventListener('done', (ev) => {
            this.log(`DONE: ${ev.data}`);
            this.isRunning = false;
            es.close();
            this._es = null;
          });
          es.addEventListener('error', (ev) => {
            this.log(`ERROR: ${(ev && ev.data) || '(connection error)'}; closing stream`);
            this.isRunning = false;
            es.close();
            this._es = null;
          });
        },
      }
    }
  </script>
</body>
</html>
"#;
